//! SQLite implementation of the aggregate sink.
//!
//! One transaction per bundle; every map row is an accumulate-upsert keyed
//! by its composite tuple, so delivery retries never duplicate rows.

use crate::reduce::aggregator::AggData;
use crate::remote::sink::{AggSink, SinkError};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteAggSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAggSink {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SinkError::Database(format!("create {}: {}", parent.display(), e)))?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS champion_stats (
                patch TEXT NOT NULL,
                champion_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                wins INTEGER NOT NULL DEFAULT 0,
                matches INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (patch, champion_id, role)
            );
            CREATE TABLE IF NOT EXISTS item_stats (
                patch TEXT NOT NULL,
                champion_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                wins INTEGER NOT NULL DEFAULT 0,
                matches INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (patch, champion_id, role, item_id)
            );
            CREATE TABLE IF NOT EXISTS item_slot_stats (
                patch TEXT NOT NULL,
                champion_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                build_slot INTEGER NOT NULL,
                wins INTEGER NOT NULL DEFAULT 0,
                matches INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (patch, champion_id, role, item_id, build_slot)
            );
            CREATE TABLE IF NOT EXISTS matchup_stats (
                patch TEXT NOT NULL,
                champion_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                enemy_champion_id INTEGER NOT NULL,
                wins INTEGER NOT NULL DEFAULT 0,
                matches INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (patch, champion_id, role, enemy_champion_id)
            );",
        )?;

        log::info!("✅ Aggregate store initialized with WAL mode");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl AggSink for SqliteAggSink {
    async fn push_agg_data(&self, data: &AggData) -> Result<(), SinkError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for (key, line) in &data.champion_stats {
            tx.execute(
                "INSERT INTO champion_stats (patch, champion_id, role, wins, matches)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(patch, champion_id, role) DO UPDATE SET
                    wins = wins + excluded.wins,
                    matches = matches + excluded.matches",
                params![key.patch, key.champion_id, key.role, line.wins, line.matches],
            )?;
        }

        for (key, line) in &data.item_stats {
            tx.execute(
                "INSERT INTO item_stats (patch, champion_id, role, item_id, wins, matches)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(patch, champion_id, role, item_id) DO UPDATE SET
                    wins = wins + excluded.wins,
                    matches = matches + excluded.matches",
                params![key.patch, key.champion_id, key.role, key.item_id, line.wins, line.matches],
            )?;
        }

        for (key, line) in &data.item_slot_stats {
            tx.execute(
                "INSERT INTO item_slot_stats (patch, champion_id, role, item_id, build_slot, wins, matches)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(patch, champion_id, role, item_id, build_slot) DO UPDATE SET
                    wins = wins + excluded.wins,
                    matches = matches + excluded.matches",
                params![
                    key.patch,
                    key.champion_id,
                    key.role,
                    key.item_id,
                    key.build_slot,
                    line.wins,
                    line.matches
                ],
            )?;
        }

        for (key, line) in &data.matchup_stats {
            tx.execute(
                "INSERT INTO matchup_stats (patch, champion_id, role, enemy_champion_id, wins, matches)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(patch, champion_id, role, enemy_champion_id) DO UPDATE SET
                    wins = wins + excluded.wins,
                    matches = matches + excluded.matches",
                params![
                    key.patch,
                    key.champion_id,
                    key.role,
                    key.enemy_champion_id,
                    line.wins,
                    line.matches
                ],
            )?;
        }

        tx.commit()?;

        log::debug!(
            "✅ Pushed bundle: {} champion, {} item, {} slot, {} matchup rows",
            data.champion_stats.len(),
            data.item_stats.len(),
            data.item_slot_stats.len(),
            data.matchup_stats.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::aggregator::{ChampionKey, MatchupKey, StatLine};
    use tempfile::tempdir;

    fn bundle_with_champion(wins: u32, matches: u32) -> AggData {
        let mut data = AggData::new();
        data.champion_stats.insert(
            ChampionKey {
                patch: "14.23".into(),
                champion_id: 103,
                role: "MIDDLE".into(),
            },
            StatLine { wins, matches },
        );
        data.matchup_stats.insert(
            MatchupKey {
                patch: "14.23".into(),
                champion_id: 103,
                role: "MIDDLE".into(),
                enemy_champion_id: 238,
            },
            StatLine { wins, matches },
        );
        data
    }

    #[tokio::test]
    async fn test_push_inserts_rows() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("stats.db");
        let sink = SqliteAggSink::new(&db_path).unwrap();

        sink.push_agg_data(&bundle_with_champion(3, 5)).await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let (wins, matches): (i64, i64) = conn
            .query_row(
                "SELECT wins, matches FROM champion_stats
                 WHERE patch = '14.23' AND champion_id = 103 AND role = 'MIDDLE'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((wins, matches), (3, 5));
    }

    #[tokio::test]
    async fn test_upsert_accumulates_counters() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("stats.db");
        let sink = SqliteAggSink::new(&db_path).unwrap();

        sink.push_agg_data(&bundle_with_champion(3, 5)).await.unwrap();
        sink.push_agg_data(&bundle_with_champion(1, 2)).await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        // Keyed upsert: one row, accumulated counters, never duplicates
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM champion_stats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);

        let (wins, matches): (i64, i64) = conn
            .query_row("SELECT wins, matches FROM champion_stats", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!((wins, matches), (4, 7));

        let matchup_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM matchup_stats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(matchup_rows, 1);
    }

    #[tokio::test]
    async fn test_empty_bundle_is_a_no_op() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("stats.db");
        let sink = SqliteAggSink::new(&db_path).unwrap();

        sink.push_agg_data(&AggData::new()).await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM champion_stats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }
}
