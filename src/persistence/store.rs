use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A stored record: an opaque JSON object. The store's primary-key field
/// must never appear inside it.
pub type Record = serde_json::Map<String, Value>;

/// Raised by store implementations and the retry wrapper around them.
///
/// `MaxRetriesExceeded` means the store could not be reached despite
/// retrying; the definitive variants (`NotFound`, `AlreadyExists`,
/// `PrimaryKeyShadowed`) mean the store answered and said no.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("payload must not contain the primary key field {field:?}")]
    PrimaryKeyShadowed { field: String },

    #[error("no record found for key {key:?}")]
    NotFound { key: String },

    #[error("a record already exists for key {key:?}")]
    AlreadyExists { key: String },

    #[error("store backend error during {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("store operation {operation} failed after {attempts} attempts")]
    MaxRetriesExceeded {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },
}

/// Keyed CRUD over JSON records.
///
/// `update` merges the partial record into the stored one; implementations
/// guarantee that two concurrent updates for the same key serialize rather
/// than interleave field-by-field.
#[async_trait]
pub trait Store: Send + Sync {
    /// Name of the primary-key field, which payloads must not contain.
    fn primary_key_field(&self) -> &str;

    async fn add(&self, key: &str, value: Record) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError>;

    async fn update(&self, key: &str, partial: Record) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Reject a payload that carries the store's primary-key field as data.
pub(crate) fn reject_primary_key_shadowing(
    field: &str,
    value: &Record,
) -> Result<(), StoreError> {
    if value.contains_key(field) {
        return Err(StoreError::PrimaryKeyShadowed {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validate a SQL identifier before it is spliced into a statement.
pub(crate) fn validate_identifier(
    identifier: &str,
    operation: &'static str,
) -> Result<(), StoreError> {
    let valid = !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Backend {
            operation,
            message: format!("invalid identifier {identifier:?}"),
        })
    }
}
