//! Uniform retry wrapping for store operations.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::store::{Record, Store, StoreError};

/// Retry policy, configured once per adaptor instance.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::constants::defaults::STORE_MAX_RETRIES,
            retry_delay: Duration::from_millis(crate::constants::defaults::STORE_RETRY_DELAY_MS),
        }
    }
}

/// Wraps an inner [`Store`] so every operation is retried with one policy.
///
/// Only backend failures are retried. A definitive answer from the store
/// (`NotFound`, `AlreadyExists`, `PrimaryKeyShadowed`) is returned as-is,
/// so exhausted retries always mean the store could not be reached.
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: Store> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn run_with_retries<T, F, Fut>(
        &self,
        operation: &'static str,
        mut action: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
    {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match action().await {
                Ok(value) => return Ok(value),
                Err(error @ StoreError::Backend { .. }) => {
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %error,
                        "Store operation failed"
                    );
                    last_error = Some(error);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
                Err(definitive) => return Err(definitive),
            }
        }
        Err(StoreError::MaxRetriesExceeded {
            operation,
            attempts,
            source: Box::new(last_error.unwrap_or(StoreError::Backend {
                operation,
                message: "no attempts were made".to_string(),
            })),
        })
    }
}

#[async_trait]
impl<S: Store> Store for RetryingStore<S> {
    fn primary_key_field(&self) -> &str {
        self.inner.primary_key_field()
    }

    async fn add(&self, key: &str, value: Record) -> Result<(), StoreError> {
        self.run_with_retries("add", || self.inner.add(key, value.clone()))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        self.run_with_retries("get", || self.inner.get(key)).await
    }

    async fn update(&self, key: &str, partial: Record) -> Result<(), StoreError> {
        self.run_with_retries("update", || self.inner.update(key, partial.clone()))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.run_with_retries("delete", || self.inner.delete(key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a backend error for the first `failures` calls, then
    /// succeeds.
    struct FlakyStore {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }

        fn attempt(&self) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(StoreError::Backend {
                    operation: "add",
                    message: format!("transient failure {call}"),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        fn primary_key_field(&self) -> &str {
            "message_id"
        }

        async fn add(&self, _key: &str, value: Record) -> Result<(), StoreError> {
            super::super::store::reject_primary_key_shadowing("message_id", &value)?;
            self.attempt()
        }

        async fn get(&self, _key: &str) -> Result<Option<Record>, StoreError> {
            self.attempt().map(|()| None)
        }

        async fn update(&self, key: &str, _partial: Record) -> Result<(), StoreError> {
            let _ = key;
            Err(StoreError::NotFound {
                key: key.to_string(),
            })
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            self.attempt()
        }
    }

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_to_success() {
        let store = RetryingStore::new(FlakyStore::new(2), config(3));
        store.add("key", Record::new()).await.unwrap();
        assert_eq!(store.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_chain_the_last_error() {
        let store = RetryingStore::new(FlakyStore::new(10), config(3));
        let err = store.add("key", Record::new()).await.unwrap_err();
        let StoreError::MaxRetriesExceeded {
            operation,
            attempts,
            source,
        } = err
        else {
            panic!("expected MaxRetriesExceeded");
        };
        assert_eq!(operation, "add");
        assert_eq!(attempts, 3);
        assert!(matches!(*source, StoreError::Backend { .. }));
        assert_eq!(store.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_definitive_answers_are_not_retried() {
        let store = RetryingStore::new(FlakyStore::new(0), config(3));
        let err = store.update("absent", Record::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let mut shadowing = Record::new();
        shadowing.insert("message_id".to_string(), serde_json::json!("x"));
        let err = store.add("key", shadowing).await.unwrap_err();
        assert!(matches!(err, StoreError::PrimaryKeyShadowed { .. }));
        // Neither definitive failure consumed a backend attempt.
        assert_eq!(store.inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_applies_to_get_and_delete_too() {
        let store = RetryingStore::new(FlakyStore::new(1), config(2));
        assert!(store.get("key").await.unwrap().is_none());

        let store = RetryingStore::new(FlakyStore::new(1), config(2));
        store.delete("key").await.unwrap();
    }
}
