//! # Interaction Registry
//!
//! Static definitions of the interactions this MHS supports, keyed by
//! interaction id. Built once at start-up from a JSON document (or the
//! compiled-in defaults) and read-only for the life of the process; an
//! unknown interaction id is a caller configuration error.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::ConfigurationError;
use crate::workflow::WorkflowType;

/// One supported interaction and how to speak it.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionDefinition {
    #[serde(skip)]
    pub interaction_id: String,
    pub service: String,
    pub action: String,
    pub workflow: WorkflowType,
    /// Whether the payload travels inside an ebXML wrapper.
    #[serde(default)]
    pub requires_ebxml_wrapper: bool,
    /// Default envelope flags, overridden by resolved reliability
    /// attributes where the pattern consults the directory.
    #[serde(default)]
    pub ack_requested: bool,
    #[serde(default)]
    pub duplicate_elimination: bool,
    #[serde(default)]
    pub sync_reply: bool,
}

/// Immutable interaction-id lookup table.
#[derive(Debug, Clone)]
pub struct InteractionRegistry {
    interactions: HashMap<String, InteractionDefinition>,
}

impl InteractionRegistry {
    /// Load definitions from a JSON object keyed by interaction id.
    pub fn from_json(raw: &str) -> Result<Self, ConfigurationError> {
        let parsed: HashMap<String, InteractionDefinition> =
            serde_json::from_str(raw).map_err(|e| ConfigurationError::InvalidValue {
                variable: "interactions".to_string(),
                message: e.to_string(),
            })?;
        let interactions = parsed
            .into_iter()
            .map(|(interaction_id, mut definition)| {
                definition.interaction_id = interaction_id.clone();
                (interaction_id, definition)
            })
            .collect();
        Ok(Self { interactions })
    }

    /// The interactions a stock deployment supports out of the box.
    pub fn defaults() -> Self {
        Self::from_json(DEFAULT_INTERACTIONS).unwrap_or_else(|e| {
            // The compiled-in table is validated by tests; reaching this
            // indicates a build defect.
            unreachable!("default interaction table failed to parse: {e}")
        })
    }

    pub fn lookup(&self, interaction_id: &str) -> Option<&InteractionDefinition> {
        self.interactions.get(interaction_id)
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }
}

const DEFAULT_INTERACTIONS: &str = r#"{
  "QUPA_IN040000UK32": {
    "service": "urn:nhs:names:services:pdsquery",
    "action": "QUPA_IN040000UK32",
    "workflow": "sync",
    "sync_reply": true
  },
  "QUPA_IN000006UK02": {
    "service": "urn:nhs:names:services:pdsquery",
    "action": "QUPA_IN000006UK02",
    "workflow": "sync",
    "sync_reply": true
  },
  "MCCI_IN010000UK13": {
    "service": "urn:nhs:names:services:psis",
    "action": "MCCI_IN010000UK13",
    "workflow": "async-express",
    "requires_ebxml_wrapper": true,
    "sync_reply": true
  },
  "REPC_IN150016UK05": {
    "service": "urn:nhs:names:services:psis",
    "action": "REPC_IN150016UK05",
    "workflow": "async-reliable",
    "requires_ebxml_wrapper": true,
    "ack_requested": true,
    "duplicate_elimination": true,
    "sync_reply": true
  },
  "COPC_IN000001UK01": {
    "service": "urn:nhs:names:services:gp2gp",
    "action": "COPC_IN000001UK01",
    "workflow": "forward-reliable",
    "requires_ebxml_wrapper": true,
    "ack_requested": true,
    "duplicate_elimination": true,
    "sync_reply": true
  }
}"#;
