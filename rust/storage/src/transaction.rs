use crate::node_store::StorageError;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Exponential backoff parameters for retried transactions.
/// # Fields
/// - `factor` - The factor to multiply the delay by on each retry
/// - `min_delay_ms` / `max_delay_ms` - Delay bounds
/// - `max_attempts` - The maximum number of attempts
#[derive(Deserialize, Clone, Serialize, Debug)]
pub struct RetryConfig {
    pub factor: f32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: usize,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            factor: 2.0,
            min_delay_ms: 100,
            max_delay_ms: 5000,
            max_attempts: 5,
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for ExponentialBuilder {
    fn from(config: &RetryConfig) -> Self {
        let b = ExponentialBuilder::default()
            .with_factor(config.factor)
            .with_min_delay(Duration::from_millis(config.min_delay_ms))
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_max_times(config.max_attempts);
        if config.jitter {
            b.with_jitter()
        } else {
            b
        }
    }
}

/// The atomic-commit-with-retry wrapper around storage work. One call runs
/// the closure as one transaction; a transient conflict rolls the work back
/// and reruns the whole closure, up to the configured attempt count.
/// Non-transient errors propagate immediately.
#[derive(Debug, Clone, Copy)]
pub struct TransactionRunner {
    backoff: ExponentialBuilder,
}

impl TransactionRunner {
    pub fn new(config: &RetryConfig) -> Self {
        TransactionRunner {
            backoff: config.into(),
        }
    }

    /// `read_only` and `requires_new` are propagation hints in the
    /// underlying engine's contract; an engine that distinguishes them can
    /// act on them, the in-memory store does not.
    pub async fn run_in_transaction<T, F, Fut>(
        &self,
        work: F,
        read_only: bool,
        _requires_new: bool,
    ) -> Result<T, StorageError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        work.retry(self.backoff)
            .when(StorageError::is_transient)
            .notify(|err, delay| {
                tracing::warn!(
                    read_only,
                    "Transaction hit a transient conflict, retrying in {:?}: {}",
                    delay,
                    err
                );
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_retry() -> TransactionRunner {
        TransactionRunner::new(&RetryConfig {
            factor: 2.0,
            min_delay_ms: 1,
            max_delay_ms: 5,
            max_attempts: 3,
            jitter: false,
        })
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let runner = fast_retry();
        let attempts = Arc::new(AtomicUsize::new(0));
        let result = runner
            .run_in_transaction(
                || {
                    let attempts = attempts.clone();
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(StorageError::TransientConflict("busy".to_string()))
                        } else {
                            Ok(42)
                        }
                    }
                },
                false,
                true,
            )
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let runner = fast_retry();
        let attempts = Arc::new(AtomicUsize::new(0));
        let err = runner
            .run_in_transaction(
                || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(StorageError::Internal("broken".to_string()))
                    }
                },
                false,
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Internal(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_propagates_the_conflict() {
        let runner = fast_retry();
        let attempts = Arc::new(AtomicUsize::new(0));
        let err = runner
            .run_in_transaction(
                || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(StorageError::TransientConflict("busy".to_string()))
                    }
                },
                false,
                true,
            )
            .await
            .unwrap_err();
        assert!(err.is_transient());
        // initial attempt + max_attempts retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
