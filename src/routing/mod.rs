//! # Routing & Reliability Resolution
//!
//! Resolves an (org code, interaction id) pair to endpoint and reliability
//! attributes through a two-stage directory query, behind a TTL cache with
//! bounded staleness. Cache trouble is never allowed to fail a resolution:
//! a cache read error is a miss, a cache write error is a log line.

pub mod cache;
pub mod directory;
pub mod resolver;
pub mod types;

use thiserror::Error;

pub use cache::{CacheError, RoutingCache, TtlCache};
pub use directory::{
    DirectoryBackend, DirectoryEntry, DirectoryError, SdsDirectory, SearchRequest,
    StaticDirectory,
};
pub use resolver::RoutingResolver;
pub use types::{EndpointDetails, ReliabilityDetails, RoutingAndReliability};

/// Raised when routing resolution fails.
#[derive(Error, Debug)]
pub enum RoutingError {
    /// The directory has no record for this org/interaction pair. This is
    /// a configuration problem and is always surfaced, never retried.
    #[error("no routing information found for {org_code} / {service_id}")]
    NotFound {
        org_code: String,
        service_id: String,
    },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("directory record is missing attribute {attribute}")]
    MissingAttribute { attribute: &'static str },

    #[error("invalid value {value:?} for directory attribute {attribute}: {message}")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
        message: String,
    },
}
