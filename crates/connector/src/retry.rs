//! Bounded retry with backoff for platform API calls
//!
//! Rate-limited responses wait out the server hint when one is given,
//! otherwise exponential backoff. Transient failures back off the same
//! way. Everything else propagates immediately.

use std::future::Future;
use std::time::Duration;

use threadline_common::config::ConnectorConfig;
use threadline_common::errors::{Result, SyncError};
use threadline_common::metrics::record_retry;

/// Attempt bounds and backoff base for retried requests
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
        }
    }

    /// Backoff for the given 1-based attempt: initial * 2^(attempt-1)
    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2_u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Run `f` until it succeeds, retries are exhausted, or it fails with a
/// non-retryable error.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match f().await {
            Ok(value) => return Ok(value),

            Err(SyncError::RateLimited { retry_after }) => {
                if attempt >= policy.max_attempts {
                    return Err(SyncError::RateLimitExhausted { attempts: attempt });
                }

                let wait = retry_after.unwrap_or_else(|| policy.backoff(attempt));
                record_retry("rate_limited");
                tracing::warn!(
                    operation,
                    attempt,
                    wait_secs = wait.as_secs_f64(),
                    "Rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
            }

            Err(err @ SyncError::Transient { .. }) => {
                if attempt >= policy.max_attempts {
                    return Err(err);
                }

                let wait = policy.backoff(attempt);
                record_retry("transient");
                tracing::warn!(
                    operation,
                    attempt,
                    wait_secs = wait.as_secs_f64(),
                    error = %err,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(wait).await;
            }

            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn honors_server_wait_hint_then_retries() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = with_retries(&policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(SyncError::RateLimited {
                        retry_after: Some(Duration::from_secs(2)),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_rate_limit_becomes_fatal() {
        let result: Result<()> = with_retries(&policy(), "test", || async {
            Err(SyncError::RateLimited { retry_after: None })
        })
        .await;

        match result {
            Err(SyncError::RateLimitExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected RateLimitExhausted, got {:?}", other.err()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_bounded() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retries(&policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::transient("connection reset")) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Transient { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_backoff_doubles() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let _: Result<()> = with_retries(&policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::transient("flaky")) }
        })
        .await;

        // 1s after attempt 1, 2s after attempt 2
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retries(&policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::auth("invalid_auth")) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Auth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
