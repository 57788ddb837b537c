//! Retry with exponential backoff for transient storage failures.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Backoff schedule for transient errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; quadruples each retry.
    pub base_delay: Duration,
    /// Operation name for logging.
    pub operation_name: &'static str,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            operation_name: "storage",
        }
    }
}

impl RetryPolicy {
    pub fn new(operation_name: &'static str) -> Self {
        Self {
            operation_name,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based): 250 ms, 1 s, 4 s.
    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(4u32.saturating_pow(retry - 1))
    }
}

/// Run `operation`, retrying transient errors per `policy`. Auth errors and
/// missing objects surface immediately.
pub async fn retry_transient<F, Fut, T>(policy: &RetryPolicy, operation: F) -> StorageResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    operation = policy.operation_name,
                    attempt,
                    ?delay,
                    error = %e,
                    "transient storage error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::new("test")
        };
        let calls = AtomicU32::new(0);

        let result = retry_transient(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StorageError::Network("flaky".into()))
                } else {
                    Ok(7u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_fail_immediately() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::new("test")
        };
        let calls = AtomicU32::new(0);

        let result: StorageResult<()> = retry_transient(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::AuthError("denied".into())) }
        })
        .await;

        assert!(matches!(result, Err(StorageError::AuthError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_exhaust_attempts() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::new("test")
        };
        let calls = AtomicU32::new(0);

        let result: StorageResult<()> = retry_transient(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::Network("down".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
