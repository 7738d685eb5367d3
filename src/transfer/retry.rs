//! Bounded retry for transient failures

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::DriveError;

/// How often and how patiently a single chunk is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first
    pub max_attempts: u32,
    /// Pause between attempts when the server gives no `Retry-After`
    pub delay: Duration,
    /// Upper bound applied to a server-provided `Retry-After`
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn pause_for(&self, err: &DriveError) -> Duration {
        err.retry_after().map(|d| d.min(self.max_delay)).unwrap_or(self.delay)
    }

    /// Run `op` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number. Exhausted retries escalate
    /// to `TransferError` carrying the last transient failure.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, DriveError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DriveError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let pause = self.pause_for(&e);
                    warn!("{} failed (attempt {}/{}), retrying in {:?}: {}", what, attempt, attempts, pause, e);
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(DriveError::TransferError {
                        message: format!("{} failed after {} attempts", what, attempts),
                        path: None,
                        source: Some(e.to_string()),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
