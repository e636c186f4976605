//! Bounded retries with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Sleep after the given failed attempt (1-based): 500ms, 1s, 2s, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Total time slept when every attempt fails.
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

/// Every attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: Option<E>,
}

/// Runs `op` until it succeeds or `policy.max_attempts` attempts failed.
///
/// `op` receives the 1-based attempt number. It reports a failed attempt
/// either as `Ok(None)` (nothing went wrong, the result just isn't there yet)
/// or as `Err(e)`. Every failed attempt, including the last one, is followed
/// by the backoff sleep so the caller can do a final check afterwards.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(Some(value)) => {
                if attempt > 1 {
                    debug!(label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Ok(None) => {
                warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "Attempt did not take effect"
                );
            }
            Err(e) => {
                warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Attempt failed"
                );
                last_error = Some(e);
            }
        }

        let delay = policy.delay_after(attempt);
        debug!(label, delay_ms = delay.as_millis() as u64, "Backing off");
        tokio::time::sleep(delay).await;
    }

    Err(RetryExhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
        assert_eq!(policy.total_delay(), Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<u32, RetryExhausted<String>> =
            retry_with_backoff(&RetryPolicy::default(), "test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(if attempt == 3 { Some(attempt) } else { None }) }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_keeps_last_error() {
        let start = Instant::now();

        let result: Result<(), RetryExhausted<String>> =
            retry_with_backoff(&RetryPolicy::default(), "test", |attempt| async move {
                Err(format!("failure {}", attempt))
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.last_error.as_deref(), Some("failure 3"));
        assert_eq!(start.elapsed(), Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_does_not_sleep() {
        let start = Instant::now();
        let result: Result<&str, RetryExhausted<String>> =
            retry_with_backoff(&RetryPolicy::default(), "test", |_| async { Ok(Some("ok")) }).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
