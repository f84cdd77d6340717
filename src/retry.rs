//! Exponential-backoff retry for the initial connection.
//!
//! Retries wrap the connection attempt only. Once a stream is established,
//! mid-stream failures are surfaced to the caller rather than silently
//! replayed, because the backend cannot resume a half-delivered analysis.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ConnectionError;

/// Backoff parameters for connection attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. Used by tests and one-shot probes.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the given retry (1-based attempt that just failed).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.initial_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// exhausts `max_attempts`.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ConnectionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConnectionError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        code = err.error_code(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "connection attempt failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
