use serde::{Deserialize, Serialize};

use crate::constants::namespaces;

/// The ebXML message frame as a value object.
///
/// One type covers requests, acknowledgements and negative
/// acknowledgements; the builders interpret the optional fields. A builder
/// generates `message_id` and `timestamp` when they are unset, so both are
/// optional here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from_party_id: String,
    pub to_party_id: String,
    pub cpa_id: String,
    pub conversation_id: String,
    pub service: String,
    pub action: String,
    pub message_id: Option<String>,
    /// Id of the message this one acknowledges or rejects.
    pub ref_to_message_id: Option<String>,
    pub timestamp: Option<String>,
    pub duplicate_elimination: bool,
    pub ack_requested: bool,
    pub ack_soap_actor: String,
    pub sync_reply: bool,
    pub payload: Option<String>,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            from_party_id: String::new(),
            to_party_id: String::new(),
            cpa_id: String::new(),
            conversation_id: String::new(),
            service: String::new(),
            action: String::new(),
            message_id: None,
            ref_to_message_id: None,
            timestamp: None,
            duplicate_elimination: false,
            ack_requested: false,
            ack_soap_actor: namespaces::ACK_SOAP_ACTOR.to_string(),
            sync_reply: false,
            payload: None,
        }
    }
}

/// One entry of an ebXML ErrorList or SOAP fault detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "codeContext")]
    pub code_context: String,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub description: String,
}
