//! Retry with exponential backoff
//!
//! `with_retry` wraps any async operation returning `Result<T, BackendError>`.
//! Only kinds listed in the policy are retried, and fatal kinds never are.
//! The delay is a `tokio::time::sleep`, so callers must not hold a lock
//! across the call.

use crate::{BackendError, BackendErrorKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for backend calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds)
    pub initial_backoff_ms: u64,

    /// Multiplier applied per attempt
    pub backoff_multiplier: f64,

    /// Upper bound on a single delay (milliseconds)
    pub max_backoff_ms: u64,

    /// Error kinds that are retried
    #[serde(default = "default_retryable")]
    pub retryable: Vec<BackendErrorKind>,
}

fn default_retryable() -> Vec<BackendErrorKind> {
    vec![BackendErrorKind::RateLimit, BackendErrorKind::Network]
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            retryable: default_retryable(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether an error should be retried under this policy
    pub fn is_retryable(&self, err: &BackendError) -> bool {
        !err.is_fatal() && self.retryable.contains(&err.kind)
    }

    /// Delay after the given failed attempt (0-based)
    ///
    /// A server-suggested `retry_after` wins when it is longer.
    pub fn backoff(&self, attempt: u32, err: &BackendError) -> Duration {
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let computed = Duration::from_millis(base.min(self.max_backoff_ms as f64) as u64);
        match err.retry_after {
            Some(server) if server > computed => server,
            _ => computed,
        }
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be >= 1.0".to_string());
        }
        Ok(())
    }
}

/// Run `operation` until it succeeds, fails non-retryably, or runs out of attempts
///
/// # Examples
///
/// ```
/// use attest_llm::{with_retry, BackendError, RetryPolicy};
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::none();
/// let result: Result<u32, BackendError> = with_retry(&policy, || async { Ok(7) }).await;
/// assert_eq!(result.unwrap(), 7);
/// # });
/// ```
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T, BackendError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= attempts || !policy.is_retryable(&err) {
                    return Err(err);
                }

                let delay = policy.backoff(attempt - 1, &err);
                warn!(
                    attempt,
                    max = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient backend error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_backoff_exponential_and_capped() {
        let policy = RetryPolicy {
            initial_backoff_ms: 1000,
            max_backoff_ms: 3000,
            ..RetryPolicy::default()
        };
        let err = BackendError::network("down");
        assert_eq!(policy.backoff(0, &err), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1, &err), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2, &err), Duration::from_millis(3000));
    }

    #[test]
    fn test_backoff_respects_retry_after() {
        let policy = RetryPolicy::default();
        let err = BackendError::rate_limit("slow down", Some(Duration::from_secs(10)));
        assert_eq!(policy.backoff(0, &err), Duration::from_secs(10));
    }

    #[test]
    fn test_fatal_never_retryable() {
        let policy = RetryPolicy {
            retryable: vec![BackendErrorKind::Auth],
            ..RetryPolicy::default()
        };
        assert!(!policy.is_retryable(&BackendError::auth("nope")));
    }

    async fn counted<T>(
        calls: &Arc<AtomicU32>,
        outcome: impl Fn(u32) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        outcome(n)
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast_policy(3), || {
            counted(&calls, |n| {
                if n < 2 {
                    Err(BackendError::rate_limit("busy", None))
                } else {
                    Ok(n)
                }
            })
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(&fast_policy(3), || {
            counted(&calls, |_| Err(BackendError::network("down")))
        })
        .await;

        assert_eq!(result.unwrap_err().kind, BackendErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(&fast_policy(5), || {
            counted(&calls, |_| Err(BackendError::billing("out of credit")))
        })
        .await;

        assert!(result.unwrap_err().is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(&fast_policy(5), || {
            counted(&calls, |_| Err(BackendError::request("bad")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy { max_attempts: 0, ..RetryPolicy::default() }.validate().is_err());
    }
}
