//! # Sync-Async Resynchroniser
//!
//! Lets a caller that issued an asynchronous-pattern request block
//! cooperatively until the correlated reply has been parked by the inbound
//! side, or give up after a bounded number of polls.
//!
//! Convention: poll first, sleep only between attempts. An exhausted wait
//! therefore performs exactly `max_retries` polls and `max_retries - 1`
//! sleeps, plus the optional initial delay. This bound is independent of
//! the workflow engine's delivery retry clock; the two must never be
//! conflated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::MhsConfig;
use crate::models::{ModelError, SyncAsyncRecord, SyncAsyncRepository};

/// Raised when a blocked caller cannot be resynchronised.
#[derive(Error, Debug)]
pub enum ResyncError {
    #[error("no response for {message_id} after {attempts} polls")]
    Timeout { message_id: String, attempts: u32 },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Sleep seam so tests can count and skip the waits.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded polling bridge between a synchronous caller and an
/// asynchronously delivered reply.
pub struct SyncAsyncResynchroniser {
    replies: SyncAsyncRepository,
    initial_delay: Duration,
    max_retries: u32,
    retry_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl SyncAsyncResynchroniser {
    pub fn new(replies: SyncAsyncRepository, config: &MhsConfig) -> Self {
        Self::with_sleeper(replies, config, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        replies: SyncAsyncRepository,
        config: &MhsConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            replies,
            initial_delay: config.resync_initial_delay,
            max_retries: config.resync_max_retries,
            retry_interval: config.resync_retry_interval,
            sleeper,
        }
    }

    /// Block until the correlated reply appears, or fail after the
    /// configured number of polls.
    pub async fn pause_request(&self, message_id: &str) -> Result<SyncAsyncRecord, ResyncError> {
        if !self.initial_delay.is_zero() {
            self.sleeper.sleep(self.initial_delay).await;
        }

        let attempts = self.max_retries.max(1);
        for attempt in 1..=attempts {
            if let Some(record) = self.replies.read(message_id).await? {
                debug!(
                    message_id = %message_id,
                    attempt = attempt,
                    "Correlated reply collected"
                );
                return Ok(record);
            }
            if attempt < attempts {
                self.sleeper.sleep(self.retry_interval).await;
            }
        }

        Err(ResyncError::Timeout {
            message_id: message_id.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Record, Store, StoreError};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Returns no record for the first `misses` reads, then a reply.
    struct ScriptedStore {
        misses: u32,
        reads: AtomicU32,
    }

    impl ScriptedStore {
        fn new(misses: u32) -> Self {
            Self {
                misses,
                reads: AtomicU32::new(0),
            }
        }

        fn reply() -> Record {
            let mut record = Record::new();
            record.insert("correlation_id".to_string(), json!("CORR-1"));
            record.insert("payload".to_string(), json!("<reply/>"));
            record.insert("headers".to_string(), json!({}));
            record.insert(
                "received_at".to_string(),
                json!("2024-03-01T10:00:00+00:00"),
            );
            record
        }
    }

    #[async_trait]
    impl Store for ScriptedStore {
        fn primary_key_field(&self) -> &str {
            "message_id"
        }

        async fn add(&self, _key: &str, _value: Record) -> Result<(), StoreError> {
            unimplemented!("resynchroniser never writes")
        }

        async fn get(&self, _key: &str) -> Result<Option<Record>, StoreError> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if read <= self.misses {
                Ok(None)
            } else {
                Ok(Some(Self::reply()))
            }
        }

        async fn update(&self, _key: &str, _partial: Record) -> Result<(), StoreError> {
            unimplemented!("resynchroniser never writes")
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            unimplemented!("resynchroniser never writes")
        }
    }

    #[derive(Default)]
    struct CountingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn config(max_retries: u32, initial_delay_ms: u64) -> MhsConfig {
        MhsConfig {
            resync_max_retries: max_retries,
            resync_retry_interval: Duration::from_millis(100),
            resync_initial_delay: Duration::from_millis(initial_delay_ms),
            ..MhsConfig::default()
        }
    }

    fn resynchroniser(
        store: Arc<ScriptedStore>,
        config: &MhsConfig,
    ) -> (SyncAsyncResynchroniser, Arc<CountingSleeper>) {
        let sleeper = Arc::new(CountingSleeper::default());
        let resynchroniser = SyncAsyncResynchroniser::with_sleeper(
            SyncAsyncRepository::new(store),
            config,
            sleeper.clone(),
        );
        (resynchroniser, sleeper)
    }

    #[tokio::test]
    async fn test_timeout_performs_exact_poll_and_sleep_counts() {
        let store = Arc::new(ScriptedStore::new(u32::MAX));
        let (resynchroniser, sleeper) = resynchroniser(store.clone(), &config(5, 0));

        let err = resynchroniser.pause_request("MSG-1").await.unwrap_err();
        assert!(matches!(err, ResyncError::Timeout { attempts: 5, .. }));
        assert_eq!(store.reads.load(Ordering::SeqCst), 5);
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_reply_on_nth_poll_returns_after_n_polls() {
        let store = Arc::new(ScriptedStore::new(2));
        let (resynchroniser, sleeper) = resynchroniser(store.clone(), &config(5, 0));

        let record = resynchroniser.pause_request("MSG-1").await.unwrap();
        assert_eq!(record.payload, "<reply/>");
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reply_on_first_poll_never_sleeps() {
        let store = Arc::new(ScriptedStore::new(0));
        let (resynchroniser, sleeper) = resynchroniser(store.clone(), &config(5, 0));

        resynchroniser.pause_request("MSG-1").await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initial_delay_sleeps_before_first_poll() {
        let store = Arc::new(ScriptedStore::new(0));
        let (resynchroniser, sleeper) = resynchroniser(store.clone(), &config(5, 250));

        resynchroniser.pause_request("MSG-1").await.unwrap();
        let sleeps = sleeper.sleeps.lock().unwrap();
        assert_eq!(sleeps.len(), 1);
        assert_eq!(sleeps[0], Duration::from_millis(250));
    }
}
