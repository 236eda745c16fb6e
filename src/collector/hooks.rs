//! Capability interfaces consumed by the orchestrator around session
//! boundaries: outbound notifications, inbound key candidates, key
//! validation, and the seed for a fresh session. Each is a one-method trait
//! so test doubles stay a few lines.

use crate::collector::crawler::FetchError;
use async_trait::async_trait;
use std::time::Duration;

/// Small structured record attached to session-boundary notifications.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub records_collected: u64,
    pub runtime: Duration,
    pub reduces_completed: u64,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_key_expired(&self, summary: &SessionSummary);
    async fn notify_new_session(&self, summary: &SessionSummary);
}

/// Default notifier: session boundaries go to the log and nowhere else.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_key_expired(&self, summary: &SessionSummary) {
        log::warn!(
            "🔑 API key expired after {:?}: {} records collected, {} reduces",
            summary.runtime,
            summary.records_collected,
            summary.reduces_completed
        );
    }

    async fn notify_new_session(&self, summary: &SessionSummary) {
        log::info!(
            "🆕 New session started (previous: {} records over {:?})",
            summary.records_collected,
            summary.runtime
        );
    }
}

/// Blocks until a key candidate arrives. Cancellation is handled by the
/// caller selecting against its shutdown token.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn wait_for_key(&self) -> Result<String, FetchError>;
}

#[async_trait]
pub trait KeyValidator: Send + Sync {
    async fn validate_key(&self, candidate: &str) -> bool;
}

/// Where a fresh session's producer queue gets its first participant.
#[async_trait]
pub trait SeedSource: Send + Sync {
    async fn top_seed(&self) -> Result<String, FetchError>;
}
