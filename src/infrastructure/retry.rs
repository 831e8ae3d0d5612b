//! Retry with exponential backoff for provider calls
//!
//! Each attempt runs under its own timeout. Delays double per attempt,
//! capped at the configured maximum, with a jitter of up to a quarter
//! of the delay so concurrent lookups do not retry in lockstep.

use std::time::Duration;

use tokio::time::error::Elapsed;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Timeout per individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = (self.base_delay_ms as f64) * 2f64.powi(attempt as i32);
        let mut delay_ms = (exponential as u64).min(self.max_delay_ms);

        let jitter_range = (delay_ms as f64 * 0.25) as u64;
        if jitter_range > 0 {
            let jitter = fastrand::u64(0..=jitter_range * 2);
            let jitter_offset = jitter.saturating_sub(jitter_range);
            delay_ms = delay_ms.saturating_add(jitter_offset);
        }

        Duration::from_millis(delay_ms)
    }
}

/// Run an async operation up to `1 + max_retries` times, each attempt
/// under the per-attempt timeout, sleeping the backoff delay between
/// failures. Timeouts convert into `E` through its `From<Elapsed>`.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: From<Elapsed>,
{
    let mut last_error: Option<E> = None;

    for attempt in 0..=policy.max_retries {
        let result = tokio::time::timeout(policy.attempt_timeout, operation()).await;

        match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => {
                last_error = Some(error);
            }
            Err(elapsed) => {
                last_error = Some(E::from(elapsed));
            }
        }

        if attempt < policy.max_retries {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    // max_retries is unsigned so the loop body ran at least once
    match last_error {
        Some(error) => Err(error),
        None => unreachable!("retry loop always records an error before exiting"),
    }
}
