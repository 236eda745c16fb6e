//! Hot-file writer with rotation into the warm directory.
//!
//! Exactly one hot file is open at any time. Every line is flushed as it is
//! written, so a reader never observes a partial record. Rotation closes the
//! hot file, moves it to `warm/` when it holds at least one record (empty
//! files are deleted, never promoted), and opens a fresh hot file.

use crate::collector::warm_lock::WarmLock;
use crate::storage::types::MatchRecord;
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

/// When the rotator seals the hot file on its own.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    /// Completed matches per hot file before rotation.
    pub match_limit: u32,
    /// Wall-clock age of the hot file before rotation.
    pub interval: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            match_limit: 25,
            interval: Duration::from_secs(300),
        }
    }
}

const IO_RETRY_ATTEMPTS: u32 = 3;
const IO_RETRY_DELAY: Duration = Duration::from_millis(10);

// Bounded in-place retry for rename/create hiccups; the last error surfaces.
fn retried<T>(mut op: impl FnMut() -> std::io::Result<T>) -> std::io::Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= IO_RETRY_ATTEMPTS {
                    return Err(e);
                }
                std::thread::sleep(IO_RETRY_DELAY * attempt);
            }
        }
    }
}

fn staged_file_name() -> String {
    // One-second resolution; a same-second rotation overwrites its
    // predecessor's name in warm. Known limitation, never loses records
    // within a single rotation.
    format!("raw_matches_{}.jsonl", Utc::now().format("%Y%m%d_%H%M%S"))
}

struct HotFile {
    writer: BufWriter<File>,
    path: PathBuf,
    records: u64,
    matches: u32,
    opened_at: Instant,
}

impl HotFile {
    fn open(hot_dir: &Path) -> Result<Self, StorageError> {
        let path = hot_dir.join(staged_file_name());
        let file = retried(|| OpenOptions::new().create(true).append(true).open(&path))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            records: 0,
            matches: 0,
            opened_at: Instant::now(),
        })
    }
}

pub struct FileRotator {
    hot_dir: PathBuf,
    warm_dir: PathBuf,
    policy: RotationPolicy,
    warm_lock: Arc<WarmLock>,
    // None once closed
    hot: Mutex<Option<HotFile>>,
    on_rotate: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    rotation_count: AtomicU64,
}

impl FileRotator {
    /// Opens a fresh hot file under `<data_root>/hot/`. A hot file left over
    /// by a previous run is swept into warm first (or deleted when empty),
    /// so records survive a crash between flush and rotation.
    pub fn new(
        data_root: impl AsRef<Path>,
        warm_lock: Arc<WarmLock>,
        policy: RotationPolicy,
    ) -> Result<Self, StorageError> {
        let hot_dir = data_root.as_ref().join("hot");
        let warm_dir = data_root.as_ref().join("warm");
        fs::create_dir_all(&hot_dir)?;
        fs::create_dir_all(&warm_dir)?;

        sweep_leftover_hot_files(&hot_dir, &warm_dir)?;

        Ok(Self {
            hot: Mutex::new(Some(HotFile::open(&hot_dir)?)),
            hot_dir,
            warm_dir,
            policy,
            warm_lock,
            on_rotate: Mutex::new(None),
            rotation_count: AtomicU64::new(0),
        })
    }

    /// Called after every rotation that produced a warm file.
    pub fn set_rotation_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_rotate.lock().unwrap() = Some(Box::new(hook));
    }

    /// Serialises one record and appends it as a complete line. The buffer
    /// is flushed before returning, so a crash between calls never leaves a
    /// partial line behind.
    pub fn write_line(&self, record: &MatchRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(record)?;

        let mut slot = self.hot.lock().unwrap();
        let hot = slot
            .as_mut()
            .ok_or_else(|| std::io::Error::new(ErrorKind::Other, "rotator is closed"))?;

        writeln!(hot.writer, "{}", json)?;
        hot.writer.flush()?;
        hot.records += 1;
        Ok(())
    }

    /// Marks a match boundary (≈10 records). Rotates when the match limit or
    /// the wall-clock interval has been reached. Returns whether a rotation
    /// ran.
    pub async fn match_complete(&self) -> Result<bool, StorageError> {
        let due = {
            let mut slot = self.hot.lock().unwrap();
            match slot.as_mut() {
                Some(hot) => {
                    hot.matches += 1;
                    hot.records > 0
                        && (hot.matches >= self.policy.match_limit
                            || hot.opened_at.elapsed() >= self.policy.interval)
                }
                None => false,
            }
        };

        if due {
            self.flush_and_rotate().await
        } else {
            Ok(false)
        }
    }

    /// Seals the current hot file. Holds the warm lock in read mode across
    /// the insert so the reducer never sees a file appear mid-enumeration.
    /// Returns true iff a warm file was produced; an empty hot file is
    /// deleted instead.
    pub async fn flush_and_rotate(&self) -> Result<bool, StorageError> {
        let produced = {
            let _warm = self.warm_lock.read().await;
            let mut slot = self.hot.lock().unwrap();
            self.rotate_locked(&mut slot)?
        };

        if produced {
            let n = self.rotation_count.fetch_add(1, Ordering::Relaxed) + 1;
            log::info!("📄 Rotated hot file into warm (rotation #{})", n);
            if let Some(hook) = self.on_rotate.lock().unwrap().as_ref() {
                hook();
            }
        }
        Ok(produced)
    }

    fn rotate_locked(&self, slot: &mut Option<HotFile>) -> Result<bool, StorageError> {
        let Some(mut hot) = slot.take() else {
            return Ok(false);
        };
        hot.writer.flush()?;

        let had_records = hot.records > 0;
        let path = hot.path;
        let name = path.file_name().map(PathBuf::from).unwrap_or_default();
        // Close the handle before rename/remove; open files cannot be
        // unlinked everywhere.
        drop(hot.writer);

        let produced = if had_records {
            let dest = self.warm_dir.join(name);
            retried(|| fs::rename(&path, &dest))?;
            true
        } else {
            fs::remove_file(&path)?;
            false
        };

        *slot = Some(HotFile::open(&self.hot_dir)?);
        Ok(produced)
    }

    /// Flushes and closes the hot file without rotating. Subsequent writes
    /// fail.
    pub fn close(&self) -> Result<(), StorageError> {
        let mut slot = self.hot.lock().unwrap();
        if let Some(mut hot) = slot.take() {
            hot.writer.flush()?;
        }
        Ok(())
    }

    /// Total rotations that produced a warm file since construction.
    pub fn rotations(&self) -> u64 {
        self.rotation_count.load(Ordering::Relaxed)
    }
}

fn sweep_leftover_hot_files(hot_dir: &Path, warm_dir: &Path) -> Result<(), StorageError> {
    for entry in fs::read_dir(hot_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let len = fs::metadata(&path)?.len();
        if len == 0 {
            fs::remove_file(&path)?;
            continue;
        }
        let dest = warm_dir.join(path.file_name().map(PathBuf::from).unwrap_or_default());
        retried(|| fs::rename(&path, &dest))?;
        log::info!(
            "♻️  Recovered leftover hot file into warm: {} ({} bytes)",
            dest.display(),
            len
        );
    }
    Ok(())
}
