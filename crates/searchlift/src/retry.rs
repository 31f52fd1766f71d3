//! Bounded fixed-delay retry for transient transport failures.
//!
//! Both transfer directions recover from network errors the same way: the
//! identical logical request is reissued after a fixed delay, a per-operation
//! counter tracks consecutive failures, and reaching the configured ceiling
//! aborts the run. There is no backoff curve; a scroll cursor only stays
//! valid for a few minutes, so spacing retries out further mostly guarantees
//! losing the cursor.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::{Error, Result};

/// Delay between consecutive retries of the same request.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Retry ceiling and pacing for one driver instance.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Consecutive transport failures tolerated before aborting.
    pub errors_allowed: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given failure ceiling and the standard delay.
    #[must_use]
    pub fn new(errors_allowed: u32) -> Self {
        Self {
            errors_allowed,
            delay: RETRY_DELAY,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs `operation`, reissuing it after [`RetryPolicy::delay`] on each
/// transient transport failure.
///
/// Non-transient errors propagate immediately. When the consecutive-failure
/// counter reaches [`RetryPolicy::errors_allowed`] the call fails with
/// [`Error::RetryExhausted`]; no partial result is ever returned.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                failures += 1;
                if failures >= policy.errors_allowed {
                    error!(
                        "{}: maximum number of retries reached after {} failures, aborting",
                        operation_name, failures
                    );
                    return Err(Error::RetryExhausted {
                        operation: operation_name,
                        attempts: failures,
                    });
                }
                warn!(
                    "{}: transport error ({}/{}), retrying in {:?}: {}",
                    operation_name, failures, policy.errors_allowed, policy.delay, e
                );
                sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(errors_allowed: u32) -> RetryPolicy {
        RetryPolicy {
            errors_allowed,
            delay: Duration::from_millis(1),
        }
    }

    fn transport_err() -> Error {
        Error::Transport {
            operation: "fetching data",
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.errors_allowed, 3);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast_policy(3), "test_op", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast_policy(3), "test_op", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transport_err())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_aborts_without_result() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32> = with_retry(&fast_policy(2), "writing data", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transport_err())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::RetryExhausted {
                operation: "writing data",
                attempts: 2
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32> = with_retry(&fast_policy(5), "test_op", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Backend {
                    status: 404,
                    message: "no such index".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Backend { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
