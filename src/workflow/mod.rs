//! # Workflow Engine
//!
//! One state machine per outbound message:
//!
//! ```text
//! RECEIVED -> PREPARING -> SENT -> { ACKD | NACKD | PREPARATION_FAILED }
//! ```
//!
//! The synchronous pattern instead terminates at
//! `SYNC_RESPONSE_SUCCESSFUL | SYNC_RESPONSE_FAILED`. Dispatch over the
//! four patterns is a `match` on [`WorkflowType`], so a new pattern cannot
//! be added without the compiler pointing at every place that must handle
//! it.
//!
//! Whatever goes wrong during preparation, the durable record is moved to
//! `PREPARATION_FAILED` before the error is surfaced, so the stored
//! lifecycle never silently disagrees with what the caller was told.

pub mod async_express;
pub mod async_reliable;
pub mod common;
pub mod forward_reliable;
pub mod sync;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::MhsConfig;
use crate::ebxml::MessageGenerationError;
use crate::fault::FaultClassificationError;
use crate::models::{InboundStatus, ModelError, WorkDescriptionRepository};
use crate::registry::InteractionDefinition;
use crate::routing::{RoutingError, RoutingResolver};
use crate::transport::{OutboundTransport, TransportError};

/// The four reliable-messaging patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowType {
    /// Request/response over one HTTP exchange, no ebXML wrapper.
    Sync,
    /// Fire once, expect a transport-level ack; the substantive reply
    /// arrives later out-of-band.
    AsyncExpress,
    /// As express, with delivery retries and reliability flags resolved
    /// from the directory.
    AsyncReliable,
    /// As reliable, addressed through the intermediary relay rather than
    /// directly to the final recipient.
    ForwardReliable,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::AsyncExpress => "async-express",
            Self::AsyncReliable => "async-reliable",
            Self::ForwardReliable => "forward-reliable",
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "async-express" => Ok(Self::AsyncExpress),
            "async-reliable" => Ok(Self::AsyncReliable),
            "forward-reliable" => Ok(Self::ForwardReliable),
            _ => Err(format!("Invalid workflow type: {s}")),
        }
    }
}

/// Raised when an outbound workflow fails.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    MessageGeneration(#[from] MessageGenerationError),

    #[error(transparent)]
    Classification(#[from] FaultClassificationError),

    #[error(transparent)]
    Persistence(#[from] ModelError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl WorkflowError {
    /// HTTP status the front door should report for this failure.
    pub fn client_status(&self) -> u16 {
        match self {
            WorkflowError::Routing(RoutingError::NotFound { .. }) => 404,
            _ => 500,
        }
    }
}

/// An accepted outbound request, as extracted by the HTTP front door.
#[derive(Debug, Clone)]
pub struct OutboundContext {
    pub message_id: String,
    pub correlation_id: String,
    pub ods_code: String,
    pub from_asid: Option<String>,
    pub payload: String,
    pub interaction: InteractionDefinition,
}

/// What the front door returns to the client: a status code and body to
/// serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowResponse {
    pub http_status: u16,
    pub body: String,
}

/// Drives one of the four patterns per message and owns every durable
/// status transition. Lower-level components never touch persistence.
pub struct WorkflowEngine {
    config: MhsConfig,
    resolver: Arc<RoutingResolver>,
    transport: Arc<dyn OutboundTransport>,
    work_descriptions: WorkDescriptionRepository,
}

impl WorkflowEngine {
    pub fn new(
        config: MhsConfig,
        resolver: Arc<RoutingResolver>,
        transport: Arc<dyn OutboundTransport>,
        work_descriptions: WorkDescriptionRepository,
    ) -> Self {
        Self {
            config,
            resolver,
            transport,
            work_descriptions,
        }
    }

    /// Accept and run an outbound request to a terminal state.
    pub async fn handle_outbound(
        &self,
        request: OutboundContext,
    ) -> Result<WorkflowResponse, WorkflowError> {
        info!(
            message_id = %request.message_id,
            interaction_id = %request.interaction.interaction_id,
            workflow = %request.interaction.workflow,
            "📨 OUTBOUND_REQUEST"
        );

        self.work_descriptions
            .create(
                &request.message_id,
                &request.correlation_id,
                request.interaction.workflow.as_str(),
            )
            .await
            .map_err(WorkflowError::from)?;

        match request.interaction.workflow {
            WorkflowType::Sync => sync::handle(self, &request).await,
            WorkflowType::AsyncExpress => async_express::handle(self, &request).await,
            WorkflowType::AsyncReliable => async_reliable::handle(self, &request).await,
            WorkflowType::ForwardReliable => forward_reliable::handle(self, &request).await,
        }
    }

    /// Record the inbound-side status for a correlated asynchronous
    /// reply, independently of the outbound machine.
    pub async fn handle_inbound(
        &self,
        message_id: &str,
        status: InboundStatus,
    ) -> Result<(), WorkflowError> {
        self.work_descriptions
            .set_inbound_status(message_id, status)
            .await
            .map_err(ModelError::from)?;
        Ok(())
    }
}
