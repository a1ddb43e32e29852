//! # Structured Error Handling
//!
//! Top-level error type for the MHS core. Each subsystem defines its own
//! `thiserror` enum close to the code that raises it; this module folds them
//! into a single [`MhsError`] so the HTTP front door can map any failure to
//! a client-facing status with one `match`.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::ebxml::{EnvelopeParsingError, MessageGenerationError};
use crate::fault::FaultClassificationError;
use crate::persistence::StoreError;
use crate::resync::ResyncError;
use crate::routing::RoutingError;
use crate::transport::TransportError;
use crate::workflow::WorkflowError;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum MhsError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    MessageGeneration(#[from] MessageGenerationError),

    #[error(transparent)]
    EnvelopeParsing(#[from] EnvelopeParsingError),

    #[error(transparent)]
    FaultClassification(#[from] FaultClassificationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Resync(#[from] ResyncError),
}

impl MhsError {
    /// HTTP status the front door should return for this failure.
    ///
    /// Configuration problems are the caller's to fix; everything else is
    /// reported as a server-side failure.
    pub fn client_status(&self) -> u16 {
        match self {
            MhsError::Configuration(_) => 400,
            MhsError::Routing(RoutingError::NotFound { .. }) => 404,
            MhsError::Workflow(e) => e.client_status(),
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, MhsError>;
