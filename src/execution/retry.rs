use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::EngineError;

/// Longest single wait between attempts.
const MAX_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Deterministic doubling schedule: `base * 2^(n-1)` after the n-th
    /// failure. Attempts are capped by `attempts`, not by elapsed time.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(MAX_DELAY)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempts run out. The last error is returned.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let attempts = policy.attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt = 1;
    loop {
        let e = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !e.is_retryable() || attempt >= attempts {
            return Err(e);
        }
        let Some(delay) = backoff.next_backoff() else {
            return Err(e);
        };
        warn!(
            %label,
            attempt,
            error = %e,
            delay_ms = delay.as_millis() as u64,
            "retry.backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
