//! Capability interface for the upstream match producer.

use crate::collector::session::SessionState;
use async_trait::async_trait;

/// Classified failure of one fetch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying with backoff (rate limit, timeout, flaky network).
    Transient(String),
    /// The API key no longer authenticates (401).
    AuthExpired,
    /// The API key is rejected outright (403). Handled like expiry.
    AuthForbidden,
    /// Not recoverable within this process; surfaces and shuts down.
    Permanent(String),
}

impl FetchError {
    /// Both auth kinds route the collector through WAITING_FOR_KEY.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, FetchError::AuthExpired | FetchError::AuthForbidden)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transient(msg) => write!(f, "transient fetch error: {}", msg),
            FetchError::AuthExpired => write!(f, "API key expired (401)"),
            FetchError::AuthForbidden => write!(f, "API key forbidden (403)"),
            FetchError::Permanent(msg) => write!(f, "permanent fetch error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// One fetch pass of the external crawler: pull the next batch of matches
/// for the participants at the head of the session queue, write the records
/// through the rotator it was constructed with, and record newly discovered
/// matches/participants in the session.
///
/// The session is only ever touched from the orchestrator task; the mutable
/// borrow here is that single-owner discipline, not a lock.
#[async_trait]
pub trait MatchCrawler: Send + Sync {
    async fn fetch_batch(&self, session: &mut SessionState) -> Result<(), FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_classification() {
        assert!(FetchError::AuthExpired.is_auth_error());
        assert!(FetchError::AuthForbidden.is_auth_error());
        assert!(!FetchError::Transient("timeout".into()).is_auth_error());
        assert!(!FetchError::Permanent("gone".into()).is_auth_error());
    }
}
