//! Capability interface for the remote aggregate store.

use crate::reduce::aggregator::AggData;
use async_trait::async_trait;

#[derive(Debug)]
pub enum SinkError {
    Database(String),
    /// The push queue was closed before the bundle could be accepted.
    QueueClosed,
    /// Shutdown was requested while waiting for queue capacity.
    Cancelled,
}

impl From<rusqlite::Error> for SinkError {
    fn from(err: rusqlite::Error) -> Self {
        SinkError::Database(err.to_string())
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Database(e) => write!(f, "Database error: {}", e),
            SinkError::QueueClosed => write!(f, "push queue is closed"),
            SinkError::Cancelled => write!(f, "push cancelled by shutdown"),
        }
    }
}

impl std::error::Error for SinkError {}

/// One delivery of a bundle to the remote store. Implementations upsert per
/// composite key, accumulating `wins`/`matches` onto whatever is already
/// stored; retry policy on transient store errors is theirs to choose.
#[async_trait]
pub trait AggSink: Send + Sync {
    async fn push_agg_data(&self, data: &AggData) -> Result<(), SinkError>;
}
