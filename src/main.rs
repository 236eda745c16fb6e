//! Collector runtime.
//!
//! Wires the pipeline for standalone operation: records arrive as
//! newline-delimited JSON on stdin (the HTTP crawler proper is an external
//! collaborator injected through the library API), aggregates land in a
//! SQLite store, key candidates are polled from a file.
//!
//! Usage:
//!   DATA_ROOT=/var/lib/matchflow matchflow < records.jsonl
//!
//! Environment variables: see `CollectorConfig::from_env` plus
//!   KEY_FILE    - file polled for a replacement API key (default: <DATA_ROOT>/key)
//!   SEED_PARTICIPANT - participant id seeding a fresh session's queue

use async_trait::async_trait;
use dotenv::dotenv;
use log::{error, info};
use matchflow::collector::crawler::{FetchError, MatchCrawler};
use matchflow::collector::hooks::{KeyProvider, KeyValidator, LogNotifier, SeedSource};
use matchflow::collector::session::SessionState;
use matchflow::collector::warm_lock::WarmLock;
use matchflow::collector::{ContinuousCollector, SessionHooks};
use matchflow::config::CollectorConfig;
use matchflow::remote::sqlite_sink::SqliteAggSink;
use matchflow::storage::rotator::{FileRotator, RotationPolicy};
use matchflow::storage::types::MatchRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Records per fetch pass; ten records ≈ one match.
const LINES_PER_BATCH: usize = 10;

/// Producer fed by newline-delimited records on stdin. EOF requests a
/// graceful shutdown, so a piped file ends with a final reduce and a clean
/// exit.
struct StdinCrawler {
    rotator: Arc<FileRotator>,
    lines: Mutex<Lines<BufReader<Stdin>>>,
    shutdown: CancellationToken,
}

impl StdinCrawler {
    fn new(rotator: Arc<FileRotator>, shutdown: CancellationToken) -> Self {
        Self {
            rotator,
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            shutdown,
        }
    }
}

#[async_trait]
impl MatchCrawler for StdinCrawler {
    async fn fetch_batch(&self, session: &mut SessionState) -> Result<(), FetchError> {
        let mut lines = self.lines.lock().await;

        for _ in 0..LINES_PER_BATCH {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("📥 Input exhausted; requesting shutdown");
                    self.shutdown.cancel();
                    return Ok(());
                }
                Err(e) => return Err(FetchError::Transient(e.to_string())),
            };
            if line.trim().is_empty() {
                continue;
            }

            let record: MatchRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("⚠️  Dropping unparseable input line: {}", e);
                    continue;
                }
            };

            if session.mark_match_seen(&record.match_id) {
                continue;
            }
            if !record.puuid.is_empty() {
                session.enqueue_participant(&record.puuid);
            }

            self.rotator
                .write_line(&record)
                .map_err(|e| FetchError::Permanent(e.to_string()))?;
            session.records_collected += 1;
        }

        self.rotator
            .match_complete()
            .await
            .map_err(|e| FetchError::Permanent(e.to_string()))?;
        Ok(())
    }
}

/// Polls a file for a replacement key; a candidate is surfaced once per
/// distinct content.
struct FileKeyProvider {
    path: PathBuf,
    last_seen: std::sync::Mutex<Option<String>>,
}

impl FileKeyProvider {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_seen: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    async fn wait_for_key(&self) -> Result<String, FetchError> {
        loop {
            if let Ok(raw) = std::fs::read_to_string(&self.path) {
                let candidate = raw.trim().to_string();
                if !candidate.is_empty() {
                    let mut last = self.last_seen.lock().unwrap();
                    if last.as_deref() != Some(candidate.as_str()) {
                        *last = Some(candidate.clone());
                        return Ok(candidate);
                    }
                }
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

/// Any non-empty candidate passes; real deployments validate against the
/// upstream API behind this trait.
struct AcceptNonEmptyKey;

#[async_trait]
impl KeyValidator for AcceptNonEmptyKey {
    async fn validate_key(&self, candidate: &str) -> bool {
        !candidate.trim().is_empty()
    }
}

struct EnvSeedSource;

#[async_trait]
impl SeedSource for EnvSeedSource {
    async fn top_seed(&self) -> Result<String, FetchError> {
        std::env::var("SEED_PARTICIPANT")
            .map_err(|_| FetchError::Transient("SEED_PARTICIPANT not set".to_string()))
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match CollectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    info!("🚀 matchflow collector starting");
    info!("   ├─ Data root: {}", config.data_root.display());
    info!("   ├─ Reduce threshold: {} rotations", config.reduce_threshold);
    info!("   ├─ Bloom reset: every {} reduces", config.bloom_reset_interval);
    info!("   ├─ Push queue: {} bundles", config.push_queue_size);
    info!("   └─ Aggregate store: {}", config.stats_db_path.display());

    let shutdown = CancellationToken::new();
    let warm_lock = Arc::new(WarmLock::new());

    let rotator = match FileRotator::new(
        &config.data_root,
        warm_lock.clone(),
        RotationPolicy {
            match_limit: config.rotate_match_limit,
            interval: config.rotate_interval,
        },
    ) {
        Ok(rotator) => Arc::new(rotator),
        Err(e) => {
            error!("❌ Failed to open hot file under {}: {}", config.data_root.display(), e);
            std::process::exit(2);
        }
    };

    let sink = match SqliteAggSink::new(&config.stats_db_path) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("❌ Failed to open aggregate store: {}", e);
            std::process::exit(2);
        }
    };

    let key_file = std::env::var("KEY_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config.data_root.join("key"));

    let crawler = Arc::new(StdinCrawler::new(rotator.clone(), shutdown.clone()));
    let hooks = SessionHooks {
        notifier: Arc::new(LogNotifier),
        key_provider: Arc::new(FileKeyProvider::new(key_file)),
        key_validator: Arc::new(AcceptNonEmptyKey),
        seed_source: Arc::new(EnvSeedSource),
    };

    // Item metadata lookups are out of scope here; every item id counts.
    // Deployments restrict to completed items by swapping this predicate.
    let item_filter = Arc::new(|_item_id: i32| true);

    let mut collector = ContinuousCollector::new(
        config,
        warm_lock,
        rotator,
        crawler,
        sink,
        hooks,
        item_filter,
        shutdown.clone(),
    );

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::warn!("⚠️  Received CTRL+C, shutting down...");
                signal_token.cancel();
            }
            Err(e) => error!("❌ Failed to listen for CTRL+C: {}", e),
        }
    });

    let exit = collector.run().await;
    std::process::exit(exit.code());
}
