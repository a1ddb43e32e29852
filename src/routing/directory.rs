//! Spine Directory Service (SDS) lookup.
//!
//! The directory is an LDAP-style store whose client connections are
//! inherently blocking, so every search is dispatched onto a bounded
//! `spawn_blocking` pool and the result delivered back to the async
//! caller. Resolution is a two-stage query: the accredited-system entry
//! for the org/interaction yields a party key, then the MHS record for
//! that party key yields the full attribute set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use super::types::{parse_iso8601_duration, RoutingAndReliability};
use super::RoutingError;

/// Search base all SDS queries run under.
const SDS_BASE: &str = "ou=services,o=nhs";

/// Directory attribute names on SDS records.
mod attributes {
    pub const PARTY_KEY: &str = "nhsMhsPartyKey";
    pub const FQDN: &str = "nhsMhsFQDN";
    pub const ENDPOINT: &str = "nhsMHSEndPoint";
    pub const CPA_ID: &str = "nhsMhsCPAId";
    pub const SYNC_REPLY_MODE: &str = "nhsMHSSyncReplyMode";
    pub const RETRIES: &str = "nhsMHSRetries";
    pub const RETRY_INTERVAL: &str = "nhsMHSRetryInterval";
    pub const PERSIST_DURATION: &str = "nhsMHSPersistDuration";
    pub const ACK_REQUESTED: &str = "nhsMHSAckRequested";
    pub const DUPLICATE_ELIMINATION: &str = "nhsMHSDuplicateElimination";
}

/// Raised by directory backends and the dispatch layer around them.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("directory connection failed: {message}")]
    Connection { message: String },

    #[error("directory search failed: {message}")]
    Search { message: String },

    #[error("directory dispatch failed: {message}")]
    Dispatch { message: String },
}

/// One directory entry: multi-valued attributes keyed by name.
#[derive(Debug, Clone, Default)]
pub struct DirectoryEntry {
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn all(&self, attribute: &str) -> Vec<String> {
        self.attributes.get(attribute).cloned().unwrap_or_default()
    }
}

/// A single directory search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: String,
    pub filter: String,
    pub attributes: Vec<String>,
}

/// Blocking directory client seam. Implementations run on the blocking
/// pool and must not assume an async context.
pub trait DirectoryBackend: Send + Sync {
    fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}

/// Async front onto a blocking [`DirectoryBackend`], capped so blocking
/// searches can never exhaust the runtime's blocking threads.
pub struct SdsDirectory {
    backend: Arc<dyn DirectoryBackend>,
    permits: Arc<Semaphore>,
}

impl SdsDirectory {
    pub fn new(backend: Arc<dyn DirectoryBackend>, pool_size: usize) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    /// Resolve the full MHS attribute set for an org/interaction pair.
    pub async fn lookup(
        &self,
        org_code: &str,
        service_id: &str,
    ) -> Result<RoutingAndReliability, RoutingError> {
        let not_found = || RoutingError::NotFound {
            org_code: org_code.to_string(),
            service_id: service_id.to_string(),
        };

        // Stage one: accredited system entry yields the party key.
        let accredited = self
            .search(SearchRequest {
                base: SDS_BASE.to_string(),
                filter: format!(
                    "(&(nhsIDCode={org_code})(objectClass=nhsAs)(nhsAsSvcIA={service_id}))"
                ),
                attributes: vec![attributes::PARTY_KEY.to_string()],
            })
            .await?;
        let party_key = accredited
            .first()
            .and_then(|entry| entry.first(attributes::PARTY_KEY))
            .map(str::to_string)
            .ok_or_else(not_found)?;

        debug!(
            org_code = %org_code,
            service_id = %service_id,
            party_key = %party_key,
            "Accredited system resolved"
        );

        // Stage two: MHS record for that party key.
        let records = self
            .search(SearchRequest {
                base: SDS_BASE.to_string(),
                filter: format!(
                    "(&(nhsMhsPartyKey={party_key})(objectClass=nhsMhs)(nhsMhsSvcIA={service_id}))"
                ),
                attributes: [
                    attributes::FQDN,
                    attributes::ENDPOINT,
                    attributes::PARTY_KEY,
                    attributes::CPA_ID,
                    attributes::SYNC_REPLY_MODE,
                    attributes::RETRIES,
                    attributes::RETRY_INTERVAL,
                    attributes::PERSIST_DURATION,
                    attributes::ACK_REQUESTED,
                    attributes::DUPLICATE_ELIMINATION,
                ]
                .iter()
                .map(|a| a.to_string())
                .collect(),
            })
            .await?;
        let record = records.into_iter().next().ok_or_else(not_found)?;

        into_routing_and_reliability(&record)
    }

    async fn search(
        &self,
        request: SearchRequest,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DirectoryError::Dispatch {
                message: e.to_string(),
            })?;
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            backend.search(&request)
        })
        .await
        .map_err(|e| DirectoryError::Dispatch {
            message: e.to_string(),
        })?
    }
}

fn into_routing_and_reliability(
    record: &DirectoryEntry,
) -> Result<RoutingAndReliability, RoutingError> {
    let required = |attribute: &'static str| {
        record
            .first(attribute)
            .map(str::to_string)
            .ok_or(RoutingError::MissingAttribute { attribute })
    };

    let endpoint_urls = record.all(attributes::ENDPOINT);
    if endpoint_urls.is_empty() {
        return Err(RoutingError::MissingAttribute {
            attribute: attributes::ENDPOINT,
        });
    }

    let retries = match record.first(attributes::RETRIES) {
        Some(raw) => raw
            .parse()
            .map_err(|_| RoutingError::InvalidAttribute {
                attribute: attributes::RETRIES,
                value: raw.to_string(),
                message: "not a number".to_string(),
            })?,
        None => 0,
    };
    let retry_interval = match record.first(attributes::RETRY_INTERVAL) {
        Some(raw) => {
            parse_iso8601_duration(raw).map_err(|message| RoutingError::InvalidAttribute {
                attribute: attributes::RETRY_INTERVAL,
                value: raw.to_string(),
                message,
            })?
        }
        None => std::time::Duration::ZERO,
    };

    Ok(RoutingAndReliability {
        fqdn: required(attributes::FQDN)?,
        endpoint_urls,
        party_key: required(attributes::PARTY_KEY)?,
        cpa_id: required(attributes::CPA_ID)?,
        sync_reply_mode: record
            .first(attributes::SYNC_REPLY_MODE)
            .unwrap_or("None")
            .to_string(),
        retries,
        retry_interval,
        persist_duration: record
            .first(attributes::PERSIST_DURATION)
            .unwrap_or_default()
            .to_string(),
        ack_requested: flag(record.first(attributes::ACK_REQUESTED)),
        duplicate_elimination: flag(record.first(attributes::DUPLICATE_ELIMINATION)),
    })
}

fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("always"))
}

/// Filter-keyed in-memory backend for tests and local runs.
#[derive(Default)]
pub struct StaticDirectory {
    entries: HashMap<String, Vec<DirectoryEntry>>,
    searches: AtomicUsize,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filter: &str, entry: DirectoryEntry) {
        self.entries
            .entry(filter.to_string())
            .or_default()
            .push(entry);
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl DirectoryBackend for StaticDirectory {
    fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.get(&request.filter).cloned().unwrap_or_default())
    }
}
