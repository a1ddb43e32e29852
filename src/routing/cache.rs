//! TTL cache for resolved routing records.
//!
//! Expiry is measured from insertion and a read never refreshes it: an
//! entry past its TTL is indistinguishable from an absent one. Writes are
//! idempotent upserts, so concurrent population of the same key from
//! parallel lookups is safe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::types::RoutingAndReliability;

/// Raised by cache backends that can actually fail. The in-process cache
/// never does, but the resolver treats any cache error as a miss, so
/// alternative backends are free to.
#[derive(Error, Debug)]
#[error("cache backend error: {message}")]
pub struct CacheError {
    pub message: String,
}

/// Cache seam the resolver talks through.
#[async_trait]
pub trait RoutingCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RoutingAndReliability>, CacheError>;
    async fn put(&self, key: &str, value: RoutingAndReliability) -> Result<(), CacheError>;
}

/// Insertion-time TTL cache over a shared map.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    data: Arc<RwLock<HashMap<String, (V, Instant)>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let cache = self.data.read().await;
        if let Some((value, inserted_at)) = cache.get(key) {
            if inserted_at.elapsed() < self.ttl {
                debug!(key = %key, "Cache hit");
                return Some(value.clone());
            }
        }
        debug!(key = %key, "Cache miss");
        None
    }

    pub async fn set(&self, key: String, value: V) {
        let mut cache = self.data.write().await;
        cache.insert(key, (value, Instant::now()));
    }
}

#[async_trait]
impl RoutingCache for TtlCache<RoutingAndReliability> {
    async fn get(&self, key: &str) -> Result<Option<RoutingAndReliability>, CacheError> {
        Ok(TtlCache::get(self, key).await)
    }

    async fn put(&self, key: &str, value: RoutingAndReliability) -> Result<(), CacheError> {
        self.set(key.to_string(), value).await;
        Ok(())
    }
}
