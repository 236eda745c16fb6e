//! Bounded exponential backoff for transient crawler errors.

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: u64,
    max_delay: u64,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    /// Delays are in seconds: `initial * 2^attempt`, capped at `max`.
    pub fn new(initial: u64, max: u64, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// Sleeps for the next delay, or returns early when `token` is
    /// cancelled. Errors once the retry budget is spent.
    pub async fn sleep(&mut self, token: &CancellationToken) -> Result<(), MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let delay = std::cmp::min(
            self.initial_delay * 2_u64.pow(self.current_attempt),
            self.max_delay,
        );

        log::warn!(
            "⏳ Retry attempt {} of {} in {}s",
            self.current_attempt + 1,
            self.max_retries,
            delay
        );

        tokio::select! {
            _ = sleep(Duration::from_secs(delay)) => {}
            _ = token.cancelled() => {}
        }
        self.current_attempt += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_budget_is_enforced() {
        let mut backoff = ExponentialBackoff::new(0, 0, 2);
        let token = CancellationToken::new();

        assert!(backoff.sleep(&token).await.is_ok());
        assert!(backoff.sleep(&token).await.is_ok());
        assert!(backoff.sleep(&token).await.is_err());

        backoff.reset();
        assert!(backoff.sleep(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_cuts_the_sleep_short() {
        let mut backoff = ExponentialBackoff::new(60, 60, 3);
        let token = CancellationToken::new();
        token.cancel();

        let start = std::time::Instant::now();
        backoff.sleep(&token).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
