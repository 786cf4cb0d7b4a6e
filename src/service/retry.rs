//! Retry with exponential backoff for transient capability failures
//!
//! Only errors whose kind is on the transient allow-list (rate limiting,
//! temporary unavailability, connection failures) are retried; every other
//! failure propagates immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Bounded exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; useful in tests.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Run `f` until it succeeds, the error is non-transient, or attempts run
/// out. Each retried failure is logged but invisible to the caller.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.min_backoff;
    let mut attempt = 1u32;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation, attempt, policy.max_attempts, backoff, err
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
