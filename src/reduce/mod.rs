//! The reduce path: warm files in, one aggregate bundle out, raw inputs
//! compressed into cold.

pub mod aggregator;
pub mod archiver;

pub use aggregator::{
    aggregate_warm_files, normalize_patch, AggData, ChampionKey, ItemKey, ItemSlotKey, MatchupKey,
    StatLine,
};
pub use archiver::archive_warm_to_cold;
