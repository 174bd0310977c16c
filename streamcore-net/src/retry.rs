//! Centralized rate-limit and backoff helper, per Design Notes §9:
//! "centralize rate-limit + Retry-After logic in one helper" rather than
//! scattering ad-hoc retry loops across `streamcore-spotify`,
//! `streamcore-qobuz`, and `streamcore-loader`.

use crate::error::{NetError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// A fixed-attempt, fixed-delay retry policy. The loader's CDN reads use
/// `RetryPolicy::new(3, Duration::from_millis(75))` exactly as §4.6
/// specifies ("up to 3 attempts with 75 ms backoff on the same URL");
/// providers with their own rate-limit semantics construct their own
/// instance with different bounds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay,
        }
    }

    /// The loader's standard policy: 3 attempts, 75ms fixed backoff.
    pub fn loader_default() -> Self {
        RetryPolicy::new(3, Duration::from_millis(75))
    }

    /// Runs `op` up to `max_attempts` times. On a
    /// `NetError::RateLimited { retry_after_ms }`, the wait is
    /// `retry_after_ms` rather than the fixed base delay, honoring a
    /// server's `Retry-After` hint instead of the client's own guess.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(NetError::RateLimited { retry_after_ms }) => {
                    warn!(attempt, retry_after_ms, "rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "retrying after transient error");
                    tokio::time::sleep(self.base_delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_works() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<u32> = policy
            .run(|_attempt| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_then_fails() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<u32> = policy
            .run(|_attempt| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NetError::UnexpectedStatus {
                    status: 500,
                    url: "http://example.test".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_on_a_later_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<u32> = policy
            .run(|attempt| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(NetError::UnexpectedStatus {
                        status: 503,
                        url: "http://example.test".into(),
                    })
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
