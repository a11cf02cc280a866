//! Retry with exponential backoff.
//!
//! ```text
//! attempt 1: wait initial_backoff
//! attempt 2: wait initial_backoff * multiplier
//! attempt 3: wait initial_backoff * multiplier^2
//! ...
//! ```
//!
//! A policy with a zero backoff, such as [`RetryPolicy::immediate`], never waits.
//! Only errors for which [`UploadError::is_retryable`] holds are retried; any
//! other error is returned after the attempt that produced it.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{Result, UploadError};

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up.
///
/// The closure receives the 1-based attempt number. `what` names the request
/// in log events.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let backoff = policy.backoff(attempt);
        attempt += 1;
        if !backoff.is_zero() {
            sleep(backoff).await;
        }

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(what, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                debug!(what, attempt, error = %e, "non-retryable error");
                return Err(e);
            }
            Err(e) if attempt >= attempts => {
                warn!(what, attempts, error = %e, "giving up after max attempts");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    what,
                    attempt,
                    max_attempts = attempts,
                    backoff_ms = policy.backoff(attempt).as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
            }
        }
    }
}

/// Bounds `request` by `limit`, if any.
pub async fn with_timeout<T, Fut>(limit: Option<Duration>, object: &str, request: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, request)
            .await
            .map_err(|_| UploadError::Timeout {
                object: object.to_string(),
                limit,
            })?,
        None => request.await,
    }
}
