//! # Retry-Wrapped Persistence
//!
//! A keyed add/get/update/delete interface over JSON records, with two
//! Postgres-backed implementations and an in-memory one for tests and
//! local runs. A [`RetryingStore`] wraps any implementation once at
//! construction time and applies the same retry policy uniformly to all
//! four operations.
//!
//! Every implementation rejects a payload that itself contains the store's
//! primary-key field, so a record can never smuggle in a conflicting key.

pub mod document;
pub mod memory;
pub mod retry;
pub mod store;
pub mod wide_column;

pub use document::DocumentStore;
pub use memory::InMemoryStore;
pub use retry::{RetryConfig, RetryingStore};
pub use store::{Record, Store, StoreError};
pub use wide_column::WideColumnStore;
