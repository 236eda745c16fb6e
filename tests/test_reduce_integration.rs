//! Integration tests for the reduce path: aggregation feeding the SQLite
//! sink, and archive round-trips over files produced by the real rotator.

use flate2::read::GzDecoder;
use matchflow::collector::warm_lock::WarmLock;
use matchflow::reduce::{aggregate_warm_files, archive_warm_to_cold, ChampionKey};
use matchflow::remote::sink::AggSink;
use matchflow::remote::sqlite_sink::SqliteAggSink;
use matchflow::storage::rotator::{FileRotator, RotationPolicy};
use matchflow::storage::types::MatchRecord;
use std::fs;
use std::io::Read;
use std::sync::Arc;
use tempfile::tempdir;

fn record(match_id: &str, champion_id: i32, role: &str, win: bool) -> MatchRecord {
    MatchRecord {
        match_id: match_id.to_string(),
        game_version: "14.23.448.1234".to_string(),
        champion_id,
        team_position: role.to_string(),
        win,
        item0: 3089,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_rotated_file_survives_archive_byte_for_byte() {
    // A file produced by the real rotator, archived and decompressed, is
    // identical to its warm bytes
    let dir = tempdir().unwrap();
    let rotator =
        FileRotator::new(dir.path(), Arc::new(WarmLock::new()), RotationPolicy::default())
            .unwrap();

    for i in 0..20 {
        rotator
            .write_line(&record(&format!("NA1_{}", i), 103, "MIDDLE", i % 2 == 0))
            .unwrap();
    }
    assert!(rotator.flush_and_rotate().await.unwrap());

    let warm_dir = dir.path().join("warm");
    let cold_dir = dir.path().join("cold");

    let warm_file = fs::read_dir(&warm_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .next()
        .unwrap();
    let warm_bytes = fs::read(&warm_file).unwrap();

    assert_eq!(archive_warm_to_cold(&warm_dir, &cold_dir).unwrap(), 1);

    let gz_path = cold_dir.join(format!(
        "{}.gz",
        warm_file.file_name().unwrap().to_string_lossy()
    ));
    let mut decompressed = Vec::new();
    GzDecoder::new(fs::File::open(&gz_path).unwrap())
        .read_to_end(&mut decompressed)
        .unwrap();

    assert_eq!(decompressed, warm_bytes);
    assert!(!warm_file.exists());
}

#[tokio::test]
async fn test_aggregate_bundle_lands_in_store_with_same_counters() {
    // aggregate → push: the store's counters equal the bundle's
    let dir = tempdir().unwrap();
    let warm_dir = dir.path().join("warm");
    fs::create_dir_all(&warm_dir).unwrap();

    let mut lines = Vec::new();
    for i in 0..10 {
        lines.push(serde_json::to_string(&record(&format!("NA1_{}", i), 103, "MIDDLE", i < 6)).unwrap());
    }
    fs::write(
        warm_dir.join("raw_matches_20250101_000000.jsonl"),
        format!("{}\n", lines.join("\n")),
    )
    .unwrap();

    let bundle = aggregate_warm_files(&warm_dir, &|_| true).unwrap();
    let key = ChampionKey {
        patch: "14.23".into(),
        champion_id: 103,
        role: "MIDDLE".into(),
    };
    assert_eq!(bundle.champion_stats[&key].wins, 6);
    assert_eq!(bundle.champion_stats[&key].matches, 10);

    let db_path = dir.path().join("stats.db");
    let sink = SqliteAggSink::new(&db_path).unwrap();
    sink.push_agg_data(&bundle).await.unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let (wins, matches): (i64, i64) = conn
        .query_row(
            "SELECT wins, matches FROM champion_stats
             WHERE patch = '14.23' AND champion_id = 103 AND role = 'MIDDLE'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((wins, matches), (6, 10));

    let item_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM item_stats", [], |row| row.get(0))
        .unwrap();
    assert_eq!(item_rows, 1, "one distinct final item across the records");

    // A second reduce over the same corpus accumulates on the same keys
    sink.push_agg_data(&bundle).await.unwrap();
    let (wins, matches): (i64, i64) = conn
        .query_row(
            "SELECT wins, matches FROM champion_stats
             WHERE patch = '14.23' AND champion_id = 103 AND role = 'MIDDLE'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((wins, matches), (12, 20));
    let champion_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM champion_stats", [], |row| row.get(0))
        .unwrap();
    assert_eq!(champion_rows, 1, "upserts stay keyed; no duplicate rows");
}

#[tokio::test]
async fn test_aggregation_is_read_only_until_archive() {
    let dir = tempdir().unwrap();
    let warm_dir = dir.path().join("warm");
    fs::create_dir_all(&warm_dir).unwrap();

    fs::write(
        warm_dir.join("raw_matches_20250101_000000.jsonl"),
        format!("{}\n", serde_json::to_string(&record("NA1_1", 1, "TOP", true)).unwrap()),
    )
    .unwrap();

    let _ = aggregate_warm_files(&warm_dir, &|_| true).unwrap();
    assert_eq!(
        fs::read_dir(&warm_dir).unwrap().count(),
        1,
        "the aggregator never deletes files"
    );
}
