use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Longest wait honored from a `Retry-After` hint, in seconds.
pub const MAX_RETRY_AFTER_SECS: f64 = 300.0;

/// Retry behavior for remote calls.
///
/// Attempt `n` (zero based) waits `min(base_delay * 2^n, max_delay)` seconds
/// unless the server sent a usable `Retry-After` hint, which wins up to
/// `max_retry_after`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: f64,
    pub max_delay: f64,
    pub backoff_multiplier: f64,
    pub max_retry_after: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: 1.0,
            max_delay: 20.0,
            backoff_multiplier: 2.0,
            max_retry_after: MAX_RETRY_AFTER_SECS,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// No waiting and no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Compute the delay in seconds before retry `attempt`.
///
/// Non-finite or negative hints are ignored. The result is always finite and
/// non-negative.
pub fn compute_backoff_delay(policy: &RetryPolicy, attempt: usize, retry_after: Option<f64>) -> f64 {
    if let Some(retry_after) = retry_after.filter(|secs| secs.is_finite() && *secs >= 0.0) {
        return retry_after.min(policy.max_retry_after.max(0.0));
    }
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = policy.base_delay * policy.backoff_multiplier.powi(exponent);
    let capped = raw.min(policy.max_delay);
    if capped.is_finite() { capped.max(0.0) } else { 0.0 }
}

/// Retry an async operation while it fails with a retryable provider error.
///
/// Permanent errors and the last transient error are returned unchanged.
pub async fn retry_async<T, Op, Fut>(
    policy: &RetryPolicy,
    mut operation: Op,
) -> Result<T, ProviderError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0usize;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.retryable || attempt >= policy.max_retries {
                    return Err(error);
                }
                let delay = compute_backoff_delay(policy, attempt, error.retry_after);
                tracing::warn!(
                    provider = %error.provider,
                    status = ?error.status_code,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_secs = delay,
                    "transient provider error, retrying"
                );
                let pause = Duration::try_from_secs_f64(delay).unwrap_or(Duration::ZERO);
                tokio::time::sleep(pause).await;
                attempt += 1;
            }
        }
    }
}
