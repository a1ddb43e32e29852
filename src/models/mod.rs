//! # Durable Message Records
//!
//! The work description is the per-message lifecycle record; the
//! sync-async record is the bridge an inbound reply is parked on until a
//! blocked synchronous caller collects it. Both live behind the
//! retry-wrapped persistence adaptor and are the only things this crate
//! ever writes durably.

pub mod sync_async_record;
pub mod work_description;

use thiserror::Error;

use crate::persistence::StoreError;

pub use sync_async_record::{SyncAsyncRecord, SyncAsyncRepository};
pub use work_description::{
    InboundStatus, OutboundStatus, WorkDescription, WorkDescriptionRepository,
};

/// Raised by the record repositories.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid status transition from {from} to {to} for message {message_id}")]
    InvalidTransition {
        message_id: String,
        from: String,
        to: String,
    },

    #[error("work description {message_id} not found")]
    NotFound { message_id: String },

    #[error("stored record for {message_id} is corrupt: {message}")]
    Corrupt {
        message_id: String,
        message: String,
    },
}
