//! Bounded retry with exponential backoff for upstream calls.

use std::future::Future;
use std::time::Duration;

/// Attempt cap and backoff schedule shared by embedding batches and generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each subsequent attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy; an attempt cap of zero is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Error returned once every attempt has failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Number of attempts made.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: E,
}

/// Run `operation` until it succeeds or the policy's attempt cap is reached.
///
/// Sleeps only between attempts, never after the last one. The `label` is attached to the
/// warning emitted for each failed attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Upstream call failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                tracing::warn!(
                    operation = label,
                    attempts = attempt,
                    error = %error,
                    "Upstream call failed; retries exhausted"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&instant_policy(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .expect("third attempt succeeds");

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reports_attempts_when_exhausted() {
        let calls = AtomicU32::new(0);
        let error = retry_with_backoff(&instant_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("down".to_string()) }
        })
        .await
        .expect_err("all attempts fail");

        assert_eq!(error.attempts, 3);
        assert_eq!(error.last_error, "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
