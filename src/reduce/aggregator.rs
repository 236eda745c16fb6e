//! Streams warm files into in-memory statistic maps.
//!
//! Read-only over the filesystem: each `*.jsonl` file in the warm directory
//! is scanned line by line into per-file maps, which are then merged into
//! the bundle. Lines that fail to parse are counted and skipped; files that
//! fail to open are skipped entirely.

use crate::storage::rotator::StorageError;
use crate::storage::types::MatchRecord;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Win/match counters shared by all four stat maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatLine {
    pub wins: u32,
    pub matches: u32,
}

impl StatLine {
    fn record(&mut self, win: bool) {
        self.matches += 1;
        if win {
            self.wins += 1;
        }
    }

    fn merge(&mut self, other: StatLine) {
        self.wins += other.wins;
        self.matches += other.matches;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChampionKey {
    pub patch: String,
    pub champion_id: i32,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub patch: String,
    pub champion_id: i32,
    pub role: String,
    pub item_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemSlotKey {
    pub patch: String,
    pub champion_id: i32,
    pub role: String,
    pub item_id: i32,
    /// 1..=6, first through sixth completed item.
    pub build_slot: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchupKey {
    pub patch: String,
    pub champion_id: i32,
    pub role: String,
    pub enemy_champion_id: i32,
}

/// One reduce's worth of aggregated statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggData {
    pub champion_stats: HashMap<ChampionKey, StatLine>,
    pub item_stats: HashMap<ItemKey, StatLine>,
    pub item_slot_stats: HashMap<ItemSlotKey, StatLine>,
    pub matchup_stats: HashMap<MatchupKey, StatLine>,
    pub detected_patch: String,
    pub files_processed: usize,
    pub total_records: usize,
    pub parse_failures: usize,
}

impl AggData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.champion_stats.is_empty()
            && self.item_stats.is_empty()
            && self.item_slot_stats.is_empty()
            && self.matchup_stats.is_empty()
    }
}

/// First two dotted segments of the upstream schema version
/// (`14.23.448.1234` -> `14.23`).
pub fn normalize_patch(version: &str) -> String {
    let mut parts = version.splitn(3, '.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{}.{}", major, minor),
        _ => version.to_string(),
    }
}

fn merge_map<K: std::hash::Hash + Eq>(into: &mut HashMap<K, StatLine>, from: HashMap<K, StatLine>) {
    for (key, line) in from {
        into.entry(key).or_default().merge(line);
    }
}

fn warm_files(warm_dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(warm_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("jsonl"))
        .collect();
    // Timestamped names sort into production order
    files.sort();
    Ok(files)
}

/// Aggregates every `*.jsonl` file in `warm_dir` into one bundle.
/// `item_filter` restricts which item ids count toward item and slot stats
/// (callers typically accept only completed items).
pub fn aggregate_warm_files(
    warm_dir: &Path,
    item_filter: &dyn Fn(i32) -> bool,
) -> Result<AggData, StorageError> {
    let mut agg = AggData::new();

    for path in warm_files(warm_dir)? {
        let file_agg = match aggregate_file(&path, item_filter) {
            Ok(file_agg) => file_agg,
            Err(e) => {
                log::warn!("⚠️  Skipping unreadable warm file {}: {}", path.display(), e);
                continue;
            }
        };

        agg.files_processed += 1;
        agg.total_records += file_agg.total_records;
        agg.parse_failures += file_agg.parse_failures;
        if !file_agg.detected_patch.is_empty() {
            agg.detected_patch = file_agg.detected_patch;
        }

        merge_map(&mut agg.champion_stats, file_agg.champion_stats);
        merge_map(&mut agg.item_stats, file_agg.item_stats);
        merge_map(&mut agg.item_slot_stats, file_agg.item_slot_stats);
        merge_map(&mut agg.matchup_stats, file_agg.matchup_stats);
    }

    log::info!(
        "📊 Aggregated {} files: {} records, {} parse failures, patch {}",
        agg.files_processed,
        agg.total_records,
        agg.parse_failures,
        if agg.detected_patch.is_empty() { "?" } else { &agg.detected_patch }
    );

    Ok(agg)
}

fn aggregate_file(path: &Path, item_filter: &dyn Fn(i32) -> bool) -> Result<AggData, StorageError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut agg = AggData::new();
    let mut match_participants: HashMap<String, Vec<MatchRecord>> = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let record: MatchRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(_) => {
                agg.parse_failures += 1;
                continue;
            }
        };

        agg.total_records += 1;

        // Role-less records stay in the files but carry no stats
        if record.team_position.is_empty() {
            continue;
        }

        let patch = normalize_patch(&record.game_version);
        if agg.detected_patch.is_empty() {
            agg.detected_patch = patch.clone();
        }

        agg.champion_stats
            .entry(ChampionKey {
                patch: patch.clone(),
                champion_id: record.champion_id,
                role: record.team_position.clone(),
            })
            .or_default()
            .record(record.win);

        // Item stats: final inventory, distinct, non-empty, filter-accepted
        let mut seen_items = HashSet::new();
        for item_id in record.final_items() {
            if item_id == 0 || !seen_items.insert(item_id) || !item_filter(item_id) {
                continue;
            }
            agg.item_stats
                .entry(ItemKey {
                    patch: patch.clone(),
                    champion_id: record.champion_id,
                    role: record.team_position.clone(),
                    item_id,
                })
                .or_default()
                .record(record.win);
        }

        // Slot stats: the first six distinct accepted items of the build
        // order, when the sampled purchase sequence is present
        if !record.build_order.is_empty() {
            let mut seen_slot_items = HashSet::new();
            let mut build_slot: u8 = 0;
            for &item_id in &record.build_order {
                if item_id == 0 || !seen_slot_items.insert(item_id) || !item_filter(item_id) {
                    continue;
                }
                build_slot += 1;
                if build_slot > 6 {
                    break;
                }
                agg.item_slot_stats
                    .entry(ItemSlotKey {
                        patch: patch.clone(),
                        champion_id: record.champion_id,
                        role: record.team_position.clone(),
                        item_id,
                        build_slot,
                    })
                    .or_default()
                    .record(record.win);
            }
        }

        match_participants
            .entry(record.match_id.clone())
            .or_default()
            .push(record);
    }

    // Second pass: matchups from participants grouped by match and role
    for participants in match_participants.into_values() {
        let mut by_role: HashMap<&str, Vec<&MatchRecord>> = HashMap::new();
        for p in &participants {
            by_role.entry(p.team_position.as_str()).or_default().push(p);
        }

        for role_players in by_role.into_values() {
            // A lane matchup is exactly one winner and one loser in the
            // role; a same-outcome pair is same-team duplication, not a
            // matchup
            if role_players.len() != 2 {
                continue;
            }
            let (p1, p2) = (role_players[0], role_players[1]);
            if p1.win == p2.win {
                continue;
            }

            let patch = normalize_patch(&p1.game_version);
            for (me, enemy) in [(p1, p2), (p2, p1)] {
                agg.matchup_stats
                    .entry(MatchupKey {
                        patch: patch.clone(),
                        champion_id: me.champion_id,
                        role: me.team_position.clone(),
                        enemy_champion_id: enemy.champion_id,
                    })
                    .or_default()
                    .record(me.win);
            }
        }
    }

    Ok(agg)
}
