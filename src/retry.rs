//! Generic retry executor with exponential backoff and jitter
//!
//! Retries transient failures of any fallible async operation. Jitter is
//! drawn uniformly from [0.8, 1.2] so concurrent callers do not retry in
//! lockstep. A fired cancellation token short-circuits both attempts and
//! backoff sleeps.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{ClientError, Result};

/// Backoff parameters for one retried operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `2` means 3 invocations total.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1_000),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Backoff delay for a 0-indexed attempt: `base * factor^attempt`, scaled
/// by uniform jitter, capped at `max_delay`.
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base_ms = policy.base_delay.as_millis() as f64 * policy.backoff_factor.powi(attempt as i32);
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    let capped_ms = (base_ms * jitter).min(policy.max_delay.as_millis() as f64);
    Duration::from_millis(capped_ms as u64)
}

/// Run `operation`, retrying on errors `should_retry` accepts.
///
/// `on_retry(attempt_number, delay, error)` fires before each backoff
/// sleep, with `attempt_number` counting from 1. Cancellation is checked
/// before every attempt and aborts a pending backoff immediately; it is
/// never passed to `should_retry`.
pub async fn with_retry<T, F, Fut, P, R>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    should_retry: P,
    mut on_retry: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&ClientError) -> bool,
    R: FnMut(u32, Duration, &ClientError),
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if err.is_cancelled() || attempt >= policy.max_retries || !should_retry(&err) {
                    return Err(err);
                }

                let delay = backoff_delay(policy, attempt);
                on_retry(attempt + 1, delay, &err);

                tokio::select! {
                    _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
