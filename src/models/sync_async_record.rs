use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::persistence::{Record, Store, StoreError};

use super::ModelError;

/// A correlated inbound reply parked for a blocked synchronous caller.
///
/// Written once by the inbound receiver; read repeatedly, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAsyncRecord {
    pub message_id: String,
    pub correlation_id: String,
    pub payload: String,
    pub headers: HashMap<String, String>,
    pub received_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct SyncAsyncRepository {
    store: Arc<dyn Store>,
}

impl SyncAsyncRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Park a reply. Write-once: a second write for the same message id is
    /// rejected by the store.
    pub async fn record_reply(
        &self,
        message_id: &str,
        correlation_id: &str,
        payload: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut record = Record::new();
        record.insert("correlation_id".to_string(), json!(correlation_id));
        record.insert("payload".to_string(), json!(payload));
        record.insert("headers".to_string(), json!(headers));
        record.insert("received_at".to_string(), json!(Utc::now().to_rfc3339()));
        self.store.add(message_id, record).await
    }

    /// Read a parked reply, if one has arrived.
    pub async fn read(&self, message_id: &str) -> Result<Option<SyncAsyncRecord>, ModelError> {
        let Some(record) = self.store.get(message_id).await? else {
            return Ok(None);
        };
        let corrupt = |message: String| ModelError::Corrupt {
            message_id: message_id.to_string(),
            message,
        };

        let correlation_id = string_field(&record, "correlation_id").map_err(|m| corrupt(m))?;
        let payload = string_field(&record, "payload").map_err(|m| corrupt(m))?;
        let headers: HashMap<String, String> = record
            .get("headers")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?
            .unwrap_or_default();
        let received_at = chrono::DateTime::parse_from_rfc3339(
            &string_field(&record, "received_at").map_err(|m| corrupt(m))?,
        )
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(e.to_string()))?;

        Ok(Some(SyncAsyncRecord {
            message_id: message_id.to_string(),
            correlation_id,
            payload,
            headers,
            received_at,
        }))
    }
}

fn string_field(record: &Record, name: &str) -> Result<String, String> {
    record
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| format!("missing or non-string field {name}"))
}
