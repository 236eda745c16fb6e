//! Warm→cold archival: gzip each staged file and delete the original.

use crate::storage::rotator::StorageError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Compresses every `*.jsonl` in `warm_dir` into `<name>.gz` under
/// `cold_dir`, removing each warm original only after its cold counterpart
/// is fully written and closed. A failed compression removes the partial
/// cold file and surfaces the error. Returns the number of files archived.
pub fn archive_warm_to_cold(warm_dir: &Path, cold_dir: &Path) -> Result<usize, StorageError> {
    fs::create_dir_all(cold_dir)?;

    let mut files: Vec<PathBuf> = fs::read_dir(warm_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("jsonl"))
        .collect();
    files.sort();

    let mut archived = 0;
    for src_path in files {
        archive_file(&src_path, cold_dir)?;
        archived += 1;
    }

    if archived > 0 {
        log::info!("🧊 Archived {} warm files into {}", archived, cold_dir.display());
    }
    Ok(archived)
}

fn archive_file(src_path: &Path, cold_dir: &Path) -> Result<(), StorageError> {
    let file_name = src_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dst_path = cold_dir.join(format!("{}.gz", file_name));

    let mut src = File::open(src_path)?;
    let dst = File::create(&dst_path)?;
    let mut encoder = GzEncoder::new(dst, Compression::default());

    let result = io::copy(&mut src, &mut encoder).and_then(|_| encoder.finish());
    let dst = match result {
        Ok(dst) => dst,
        Err(e) => {
            drop(src);
            let _ = fs::remove_file(&dst_path);
            return Err(e.into());
        }
    };

    // Both handles closed before the unlink; open files cannot be removed
    // everywhere
    drop(dst);
    drop(src);

    fs::remove_file(src_path)?;
    Ok(())
}
