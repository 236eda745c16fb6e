//! The continuous collector: wires the rotator, warm lock/counter, reducer,
//! archiver and pusher together over one session and drives the state
//! machine.
//!
//! Everything stateful that is not behind a lock (the session blooms and
//! producer queue, the reduce procedure) runs on this task. Every trigger
//! source (the warm counter crossing its threshold, an auth-classified
//! crawler error, the shutdown signal) funnels into the same COLLECTING →
//! REDUCING compare-and-set, so two reduces can never overlap.

use crate::collector::backoff::ExponentialBackoff;
use crate::collector::crawler::{FetchError, MatchCrawler};
use crate::collector::hooks::{KeyProvider, KeyValidator, Notifier, SeedSource};
use crate::collector::session::SessionState;
use crate::collector::state::{MachineState, StateMachine};
use crate::collector::warm_counter::WarmFileCounter;
use crate::collector::warm_lock::WarmLock;
use crate::config::CollectorConfig;
use crate::reduce::{aggregate_warm_files, archive_warm_to_cold};
use crate::remote::pusher::AggPusher;
use crate::remote::sink::AggSink;
use crate::storage::rotator::{FileRotator, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// How the collector run ended; maps onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorExit {
    /// Clean shutdown, pusher fully drained.
    Clean,
    /// Shutdown deadline elapsed with pushes still queued; those bundles are
    /// lost.
    DrainTimeout,
    /// Permanent crawler error or unrecoverable filesystem error.
    Fatal,
}

impl CollectorExit {
    pub fn code(&self) -> i32 {
        match self {
            CollectorExit::Clean => 0,
            CollectorExit::DrainTimeout => 1,
            CollectorExit::Fatal => 2,
        }
    }
}

/// The session-boundary collaborators, grouped so wiring stays readable.
pub struct SessionHooks {
    pub notifier: Arc<dyn Notifier>,
    pub key_provider: Arc<dyn KeyProvider>,
    pub key_validator: Arc<dyn KeyValidator>,
    pub seed_source: Arc<dyn SeedSource>,
}

pub struct ContinuousCollector {
    config: CollectorConfig,
    state: Arc<StateMachine>,
    warm_lock: Arc<WarmLock>,
    rotator: Arc<FileRotator>,
    counter: Arc<WarmFileCounter>,
    pusher: Arc<AggPusher>,
    crawler: Arc<dyn MatchCrawler>,
    hooks: SessionHooks,
    item_filter: Arc<dyn Fn(i32) -> bool + Send + Sync>,
    session: SessionState,
    shutdown: CancellationToken,
    key_expired: Arc<AtomicBool>,
    fatal: Option<String>,
    final_reduce_done: bool,
    reduces_completed: u64,
}

impl ContinuousCollector {
    /// Binds the component graph: the rotator's rotation hook increments
    /// the warm counter, and the counter's threshold callback attempts the
    /// COLLECTING → REDUCING compare-and-set.
    ///
    /// `rotator` must be the same instance the crawler writes through,
    /// built over `warm_lock`; that shared read side is what keeps rotations
    /// out of the reducer's enumeration window. `shutdown` is the root
    /// token; cancelling it requests a graceful shutdown.
    pub fn new(
        config: CollectorConfig,
        warm_lock: Arc<WarmLock>,
        rotator: Arc<FileRotator>,
        crawler: Arc<dyn MatchCrawler>,
        sink: Arc<dyn AggSink>,
        hooks: SessionHooks,
        item_filter: Arc<dyn Fn(i32) -> bool + Send + Sync>,
        shutdown: CancellationToken,
    ) -> Self {
        let state = Arc::new(StateMachine::new());

        let counter = {
            let state = state.clone();
            Arc::new(WarmFileCounter::new(config.reduce_threshold, move || {
                if state.try_transition_to_reducing() {
                    log::info!("📈 Warm threshold reached; reduce scheduled");
                }
            }))
        };
        {
            let counter = counter.clone();
            rotator.set_rotation_hook(move || counter.increment());
        }

        let pusher = Arc::new(AggPusher::with_capacity(sink, config.push_queue_size));

        Self {
            config,
            state,
            warm_lock,
            rotator,
            counter,
            pusher,
            crawler,
            hooks,
            item_filter,
            session: SessionState::new(),
            shutdown,
            key_expired: Arc::new(AtomicBool::new(false)),
            fatal: None,
            final_reduce_done: false,
            reduces_completed: 0,
        }
    }

    /// Cancel this to request a graceful shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> Arc<StateMachine> {
        self.state.clone()
    }

    pub fn rotator(&self) -> Arc<FileRotator> {
        self.rotator.clone()
    }

    pub fn warm_counter(&self) -> Arc<WarmFileCounter> {
        self.counter.clone()
    }

    pub fn warm_lock(&self) -> Arc<WarmLock> {
        self.warm_lock.clone()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    /// Runs until SHUTDOWN, then drains the pusher. The returned exit maps
    /// to the process exit code.
    pub async fn run(&mut self) -> CollectorExit {
        self.pusher.start(self.shutdown.clone());
        let mut backoff = ExponentialBackoff::new(1, 60, 10);

        loop {
            match self.state.current() {
                MachineState::Startup => self.step_startup().await,
                MachineState::Collecting => self.step_collecting(&mut backoff).await,
                MachineState::Reducing => {
                    if let Err(e) = self.run_reduce().await {
                        log::error!("❌ Reduce failed: {}", e);
                        self.fatal = Some(e.to_string());
                        let _ = self.state.transition_to(MachineState::Shutdown);
                    }
                }
                // Only observable mid-reduce; the reduce advances it
                MachineState::Pushing => tokio::time::sleep(Duration::from_millis(10)).await,
                MachineState::WaitingForKey => self.step_waiting_for_key().await,
                MachineState::FreshRestart => self.step_fresh_restart().await,
                MachineState::Shutdown => break,
            }
        }

        let drained = self.pusher.wait(self.config.shutdown_deadline).await;
        if let Err(e) = self.rotator.close() {
            log::error!("❌ Closing hot file failed: {}", e);
        }

        let exit = if self.fatal.is_some() {
            CollectorExit::Fatal
        } else if !drained {
            CollectorExit::DrainTimeout
        } else {
            CollectorExit::Clean
        };
        log::info!("🏁 Collector stopped: {:?} (exit code {})", exit, exit.code());
        exit
    }

    async fn step_startup(&mut self) {
        if self.shutdown.is_cancelled() {
            let _ = self.state.transition_to(MachineState::Shutdown);
            return;
        }

        if self.session.queue_len() == 0 {
            let seed_source = self.hooks.seed_source.clone();
            match seed_source.top_seed().await {
                Ok(puuid) => {
                    self.session.enqueue_participant(&puuid);
                    log::info!("🌱 Producer queue seeded");
                }
                Err(e) => log::warn!("⚠️  Seed fetch failed, starting with empty queue: {}", e),
            }
        }

        if let Err(e) = self.state.transition_to(MachineState::Collecting) {
            log::error!("❌ {}", e);
        }
    }

    async fn step_collecting(&mut self, backoff: &mut ExponentialBackoff) {
        enum Step {
            Cancelled,
            Fetched(Result<(), FetchError>),
        }

        if self.shutdown.is_cancelled() {
            self.begin_shutdown_from_collecting();
            return;
        }

        let crawler = self.crawler.clone();
        let shutdown = self.shutdown.clone();
        let step = tokio::select! {
            _ = shutdown.cancelled() => Step::Cancelled,
            result = crawler.fetch_batch(&mut self.session) => Step::Fetched(result),
        };

        match step {
            Step::Cancelled => self.begin_shutdown_from_collecting(),
            Step::Fetched(Ok(())) => backoff.reset(),
            Step::Fetched(Err(e)) => self.handle_fetch_error(e, backoff).await,
        }
    }

    /// One final reduce promotes in-flight records before the machine goes
    /// down; after that, COLLECTING exits straight to SHUTDOWN.
    fn begin_shutdown_from_collecting(&mut self) {
        if !self.final_reduce_done {
            self.final_reduce_done = true;
            if self.state.try_transition_to_reducing() {
                return;
            }
        }
        let _ = self.state.transition_to(MachineState::Shutdown);
    }

    async fn handle_fetch_error(&mut self, error: FetchError, backoff: &mut ExponentialBackoff) {
        match error {
            FetchError::Transient(msg) => {
                log::warn!("⚠️  Transient fetch error: {}", msg);
                if backoff.sleep(&self.shutdown).await.is_err() {
                    log::error!("❌ Transient errors exhausted the retry budget");
                    self.fatal = Some("transient fetch errors exhausted retry budget".to_string());
                    self.shutdown.cancel();
                }
            }
            FetchError::AuthExpired | FetchError::AuthForbidden => {
                log::warn!("🔑 {}; scheduling reduce before key wait", error);
                self.key_expired.store(true, Ordering::SeqCst);
                // Losing the CAS means a reduce is already running; the
                // latch routes it to WAITING_FOR_KEY when it completes
                self.state.try_transition_to_reducing();
            }
            FetchError::Permanent(msg) => {
                log::error!("❌ Permanent fetch error: {}", msg);
                self.fatal = Some(msg);
                self.shutdown.cancel();
            }
        }
    }

    /// The reduce procedure. Enters in REDUCING, leaves in COLLECTING or
    /// WAITING_FOR_KEY (key-expiry latched) via PUSHING.
    async fn run_reduce(&mut self) -> Result<(), StorageError> {
        let started = Instant::now();

        // 1. Promote whatever is in flight in the hot file
        self.rotator.flush_and_rotate().await?;

        // 2-5. Aggregate and archive under the exclusive warm lock; the set
        // of warm files is frozen in between
        let bundle = {
            let _guard = self.warm_lock.write().await;
            let filter = |item_id: i32| (self.item_filter)(item_id);
            let bundle = aggregate_warm_files(&self.config.warm_dir(), &filter)?;
            archive_warm_to_cold(&self.config.warm_dir(), &self.config.cold_dir())?;
            bundle
        };

        // 6. Hand off to the pusher; accepted means queued, not delivered
        if let Err(e) = self.state.transition_to(MachineState::Pushing) {
            log::error!("❌ {}", e);
        }
        if bundle.is_empty() {
            log::debug!("📭 Nothing aggregated; skipping push");
        } else if let Err(e) = self.pusher.push(bundle).await {
            log::error!("❌ Bundle not accepted for push: {}", e);
        }

        // 8. Re-arm the batch trigger
        self.counter.reset();
        self.reduces_completed += 1;

        if self.reduces_completed % self.config.bloom_reset_interval == 0 {
            self.session.reset_blooms();
        }

        log::info!(
            "✅ Reduce #{} complete in {:?} (lock metrics: {:?})",
            self.reduces_completed,
            started.elapsed(),
            self.warm_lock.metrics()
        );

        // 9. Key expiry routes to the waiting room instead of back to work
        let next = if self.key_expired.load(Ordering::SeqCst) {
            MachineState::WaitingForKey
        } else {
            MachineState::Collecting
        };
        if let Err(e) = self.state.transition_to(next) {
            log::error!("❌ {}", e);
        }
        Ok(())
    }

    async fn step_waiting_for_key(&mut self) {
        let summary = self.session.summary(self.reduces_completed);
        self.hooks.notifier.notify_key_expired(&summary).await;

        let key_provider = self.hooks.key_provider.clone();
        let key_validator = self.hooks.key_validator.clone();
        let shutdown = self.shutdown.clone();

        loop {
            enum Step {
                Cancelled,
                Candidate(Result<String, FetchError>),
            }

            let step = tokio::select! {
                _ = shutdown.cancelled() => Step::Cancelled,
                candidate = key_provider.wait_for_key() => Step::Candidate(candidate),
            };

            match step {
                Step::Cancelled => {
                    let _ = self.state.transition_to(MachineState::Shutdown);
                    return;
                }
                Step::Candidate(Ok(candidate)) => {
                    if key_validator.validate_key(&candidate).await {
                        log::info!("🔑 New API key validated");
                        let _ = self.state.transition_to(MachineState::FreshRestart);
                        return;
                    }
                    log::warn!("⚠️  Key candidate rejected; still waiting");
                }
                Step::Candidate(Err(e)) => {
                    log::warn!("⚠️  Key provider error: {}", e);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
    }

    async fn step_fresh_restart(&mut self) {
        let old_summary = self.session.summary(self.reduces_completed);

        self.session.clear_for_restart();
        self.counter.reset();
        self.key_expired.store(false, Ordering::SeqCst);

        let _ = self.state.transition_to(MachineState::Startup);
        self.hooks.notifier.notify_new_session(&old_summary).await;
    }
}
