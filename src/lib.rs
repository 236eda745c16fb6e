//! matchflow - Continuous Match-Data Collection Pipeline
//!
//! Ingests per-participant match records from an upstream crawler, stages
//! them through a three-tier file hierarchy, periodically reduces staged
//! data into compact statistics, archives the raw inputs, and pushes
//! aggregates to a relational store. One run is bounded by the lifetime of
//! a third-party API key (a "session").
//!
//! # Architecture
//!
//! ```text
//! MatchCrawler → FileRotator (hot/) ──rotate──→ warm/ ──reduce──→ cold/ (.gz)
//!                      │                           │
//!                      └── WarmFileCounter ──┐     └── AggData
//!                                            ↓            ↓
//!               StateMachine (COLLECTING → REDUCING → PUSHING → …)
//!                                                         ↓
//!                                      AggPusher → SQLite aggregate store
//! ```
//!
//! The three load-bearing pieces: the single-writer hot-file rotator, the
//! reduce orchestration over the state machine's compare-and-set, and the
//! warm-directory lock discipline that freezes warm membership while the
//! reducer enumerates it.

pub mod bloom;
pub mod collector;
pub mod config;
pub mod reduce;
pub mod remote;
pub mod storage;

pub use collector::{CollectorExit, ContinuousCollector, SessionHooks};
pub use config::{CollectorConfig, ConfigError};
pub use reduce::AggData;
pub use storage::MatchRecord;
