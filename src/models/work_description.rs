use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::logging::log_state_transition;
use crate::persistence::{Record, Store, StoreError};

use super::ModelError;

/// Outbound lifecycle states for a message.
///
/// `Received` is the sole initial state. The acknowledgement states and
/// the two synchronous response states are terminal and never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundStatus {
    /// Request accepted from the client application.
    Received,
    /// Routing resolution and envelope construction in progress.
    Preparing,
    /// Handed to the backbone, awaiting acknowledgement.
    Sent,
    /// Positively acknowledged.
    Ackd,
    /// Negatively acknowledged or delivery gave up.
    Nackd,
    /// Failed before anything left the process.
    PreparationFailed,
    /// Synchronous pattern only: response returned to the caller.
    SyncResponseSuccessful,
    SyncResponseFailed,
}

impl OutboundStatus {
    /// Check if this is a terminal state (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Ackd
                | Self::Nackd
                | Self::PreparationFailed
                | Self::SyncResponseSuccessful
                | Self::SyncResponseFailed
        )
    }

    /// Position in the lifecycle; transitions must strictly advance.
    fn rank(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Preparing => 1,
            Self::Sent => 2,
            _ => 3,
        }
    }

    /// Transitions are monotonic and terminal states are never left.
    pub fn can_transition_to(&self, next: OutboundStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for OutboundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::Preparing => "PREPARING",
            Self::Sent => "SENT",
            Self::Ackd => "ACKD",
            Self::Nackd => "NACKD",
            Self::PreparationFailed => "PREPARATION_FAILED",
            Self::SyncResponseSuccessful => "SYNC_RESPONSE_SUCCESSFUL",
            Self::SyncResponseFailed => "SYNC_RESPONSE_FAILED",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for OutboundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(Self::Received),
            "PREPARING" => Ok(Self::Preparing),
            "SENT" => Ok(Self::Sent),
            "ACKD" => Ok(Self::Ackd),
            "NACKD" => Ok(Self::Nackd),
            "PREPARATION_FAILED" => Ok(Self::PreparationFailed),
            "SYNC_RESPONSE_SUCCESSFUL" => Ok(Self::SyncResponseSuccessful),
            "SYNC_RESPONSE_FAILED" => Ok(Self::SyncResponseFailed),
            _ => Err(format!("Invalid outbound status: {s}")),
        }
    }
}

/// Inbound lifecycle states, written independently of the outbound
/// machine when a correlated asynchronous reply arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundStatus {
    ResponseReceived,
    ResponseProcessed,
    ResponseFailed,
}

impl fmt::Display for InboundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResponseReceived => "RESPONSE_RECEIVED",
            Self::ResponseProcessed => "RESPONSE_PROCESSED",
            Self::ResponseFailed => "RESPONSE_FAILED",
        };
        write!(f, "{name}")
    }
}

/// The durable per-message lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDescription {
    pub message_id: String,
    pub correlation_id: String,
    pub workflow: String,
    pub outbound_status: OutboundStatus,
    pub inbound_status: Option<InboundStatus>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl WorkDescription {
    /// Serialize for storage. The message id is the store key and must not
    /// appear in the record itself.
    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("correlation_id".to_string(), json!(self.correlation_id));
        record.insert("workflow".to_string(), json!(self.workflow));
        record.insert("outbound_status".to_string(), json!(self.outbound_status));
        record.insert("inbound_status".to_string(), json!(self.inbound_status));
        record.insert("created_at".to_string(), json!(self.created_at.to_rfc3339()));
        record.insert("updated_at".to_string(), json!(self.updated_at.to_rfc3339()));
        record
    }

    fn from_record(message_id: &str, record: &Record) -> Result<Self, ModelError> {
        let corrupt = |message: String| ModelError::Corrupt {
            message_id: message_id.to_string(),
            message,
        };
        let field = |name: &str| {
            record
                .get(name)
                .cloned()
                .ok_or_else(|| corrupt(format!("missing field {name}")))
        };
        Ok(Self {
            message_id: message_id.to_string(),
            correlation_id: serde_json::from_value(field("correlation_id")?)
                .map_err(|e| corrupt(e.to_string()))?,
            workflow: serde_json::from_value(field("workflow")?)
                .map_err(|e| corrupt(e.to_string()))?,
            outbound_status: serde_json::from_value(field("outbound_status")?)
                .map_err(|e| corrupt(e.to_string()))?,
            inbound_status: serde_json::from_value(field("inbound_status")?)
                .map_err(|e| corrupt(e.to_string()))?,
            created_at: parse_timestamp(&field("created_at")?).map_err(|m| corrupt(m))?,
            updated_at: parse_timestamp(&field("updated_at")?).map_err(|m| corrupt(m))?,
        })
    }
}

fn parse_timestamp(value: &serde_json::Value) -> Result<chrono::DateTime<Utc>, String> {
    let raw = value.as_str().ok_or("timestamp is not a string")?;
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

/// Repository over the persistence adaptor. Every status change is one
/// keyed update, so the backing store's at-most-one-writer discipline
/// applies per message id.
#[derive(Clone)]
pub struct WorkDescriptionRepository {
    store: Arc<dyn Store>,
}

impl WorkDescriptionRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create the record in its initial state.
    pub async fn create(
        &self,
        message_id: &str,
        correlation_id: &str,
        workflow: &str,
    ) -> Result<WorkDescription, ModelError> {
        let now = Utc::now();
        let description = WorkDescription {
            message_id: message_id.to_string(),
            correlation_id: correlation_id.to_string(),
            workflow: workflow.to_string(),
            outbound_status: OutboundStatus::Received,
            inbound_status: None,
            created_at: now,
            updated_at: now,
        };
        self.store.add(message_id, description.to_record()).await?;
        log_state_transition(message_id, workflow, None, "RECEIVED");
        Ok(description)
    }

    pub async fn get(&self, message_id: &str) -> Result<Option<WorkDescription>, ModelError> {
        match self.store.get(message_id).await? {
            Some(record) => Ok(Some(WorkDescription::from_record(message_id, &record)?)),
            None => Ok(None),
        }
    }

    /// Advance the outbound status, enforcing monotonic transitions.
    pub async fn set_outbound_status(
        &self,
        message_id: &str,
        next: OutboundStatus,
    ) -> Result<(), ModelError> {
        let current = self
            .get(message_id)
            .await?
            .ok_or_else(|| ModelError::NotFound {
                message_id: message_id.to_string(),
            })?;
        if !current.outbound_status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                message_id: message_id.to_string(),
                from: current.outbound_status.to_string(),
                to: next.to_string(),
            });
        }

        let mut partial = Record::new();
        partial.insert("outbound_status".to_string(), json!(next));
        partial.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        self.store.update(message_id, partial).await?;
        log_state_transition(
            message_id,
            &current.workflow,
            Some(&current.outbound_status.to_string()),
            &next.to_string(),
        );
        Ok(())
    }

    /// Record the inbound-side status, independent of the outbound
    /// machine.
    pub async fn set_inbound_status(
        &self,
        message_id: &str,
        status: InboundStatus,
    ) -> Result<(), StoreError> {
        let mut partial = Record::new();
        partial.insert("inbound_status".to_string(), json!(status));
        partial.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        self.store.update(message_id, partial).await
    }
}
