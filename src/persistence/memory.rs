//! In-memory store for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{reject_primary_key_shadowing, Record, Store, StoreError};

/// A [`Store`] over a process-local map, with the same semantics as the
/// database-backed implementations.
pub struct InMemoryStore {
    primary_key_field: String,
    data: RwLock<HashMap<String, Record>>,
}

impl InMemoryStore {
    pub fn new(primary_key_field: impl Into<String>) -> Self {
        Self {
            primary_key_field: primary_key_field.into(),
            data: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn primary_key_field(&self) -> &str {
        &self.primary_key_field
    }

    async fn add(&self, key: &str, value: Record) -> Result<(), StoreError> {
        reject_primary_key_shadowing(&self.primary_key_field, &value)?;
        let mut data = self.data.write().await;
        if data.contains_key(key) {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn update(&self, key: &str, partial: Record) -> Result<(), StoreError> {
        reject_primary_key_shadowing(&self.primary_key_field, &partial)?;
        let mut data = self.data.write().await;
        let record = data.get_mut(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        for (field, value) in partial {
            record.insert(field, value);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        data.remove(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: &[(&str, &str)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_add_get_update_delete() {
        let store = InMemoryStore::new("message_id");
        store
            .add("abc", record(&[("workflow", "sync")]))
            .await
            .unwrap();

        let fetched = store.get("abc").await.unwrap().unwrap();
        assert_eq!(fetched["workflow"], "sync");

        store
            .update("abc", record(&[("outbound_status", "SENT")]))
            .await
            .unwrap();
        let fetched = store.get("abc").await.unwrap().unwrap();
        assert_eq!(fetched["workflow"], "sync");
        assert_eq!(fetched["outbound_status"], "SENT");

        store.delete("abc").await.unwrap();
        assert!(store.get("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_key() {
        let store = InMemoryStore::new("message_id");
        store.add("abc", Record::new()).await.unwrap();
        let err = store.add("abc", Record::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_key_is_not_found() {
        let store = InMemoryStore::new("message_id");
        let err = store.update("absent", Record::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_primary_key_shadowing_rejected_on_add_and_update() {
        let store = InMemoryStore::new("message_id");
        let shadowing = record(&[("message_id", "boom")]);

        let err = store.add("abc", shadowing.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::PrimaryKeyShadowed { .. }));

        store.add("abc", Record::new()).await.unwrap();
        let err = store.update("abc", shadowing).await.unwrap_err();
        assert!(matches!(err, StoreError::PrimaryKeyShadowed { .. }));
    }
}
