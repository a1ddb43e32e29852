//! Shared mechanics for the pattern handlers: preparation failure
//! bookkeeping, envelope assembly and the bounded reliable-delivery loop.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{error, warn};

use crate::constants::mime;
use crate::ebxml::Envelope;
use crate::fault::{
    classify_ebxml_response, classify_soap_response, EbxmlClassification, SoapClassification,
};
use crate::logging::log_send_attempt;
use crate::models::OutboundStatus;
use crate::routing::{EndpointDetails, ReliabilityDetails, RoutingError};

use super::{OutboundContext, WorkflowEngine, WorkflowError};

/// Move the record to `PREPARATION_FAILED`. Best effort: a failure to
/// record the failure is logged, never allowed to mask the original error.
pub(crate) async fn mark_preparation_failed(engine: &WorkflowEngine, message_id: &str) {
    if let Err(e) = engine
        .work_descriptions
        .set_outbound_status(message_id, OutboundStatus::PreparationFailed)
        .await
    {
        error!(
            message_id = %message_id,
            error = %e,
            "Failed to record preparation failure"
        );
    }
}

/// Run one preparation step; on failure persist `PREPARATION_FAILED`
/// before surfacing the error.
pub(crate) async fn prepare_step<T, E>(
    engine: &WorkflowEngine,
    message_id: &str,
    result: Result<T, E>,
) -> Result<T, WorkflowError>
where
    E: Into<WorkflowError>,
{
    match result {
        Ok(value) => Ok(value),
        Err(error) => {
            mark_preparation_failed(engine, message_id).await;
            Err(error.into())
        }
    }
}

/// Pick the delivery URL from the resolved endpoint.
pub(crate) fn delivery_url(
    endpoint: &EndpointDetails,
    request: &OutboundContext,
) -> Result<String, RoutingError> {
    endpoint
        .endpoint_urls
        .first()
        .cloned()
        .ok_or_else(|| RoutingError::NotFound {
            org_code: request.ods_code.clone(),
            service_id: request.interaction.interaction_id.clone(),
        })
}

/// Assemble the envelope for a wrapped send. Reliability attributes, when
/// resolved, override the interaction's default flags.
pub(crate) fn request_envelope(
    engine: &WorkflowEngine,
    request: &OutboundContext,
    endpoint: &EndpointDetails,
    reliability: Option<&ReliabilityDetails>,
) -> Envelope {
    let (ack_requested, duplicate_elimination, sync_reply) = match reliability {
        Some(reliability) => (
            reliability.ack_requested,
            reliability.duplicate_elimination,
            !reliability.sync_reply_mode.eq_ignore_ascii_case("none"),
        ),
        None => (
            request.interaction.ack_requested,
            request.interaction.duplicate_elimination,
            request.interaction.sync_reply,
        ),
    };

    Envelope {
        from_party_id: engine.config.party_key.clone(),
        to_party_id: endpoint.party_key.clone(),
        cpa_id: endpoint.cpa_id.clone(),
        conversation_id: request.correlation_id.clone(),
        service: request.interaction.service.clone(),
        action: request.interaction.action.clone(),
        message_id: Some(request.message_id.clone()),
        timestamp: None,
        duplicate_elimination,
        ack_requested,
        sync_reply,
        payload: Some(request.payload.clone()),
        ..Envelope::default()
    }
}

/// HTTP headers for an unwrapped (synchronous pattern) send.
pub(crate) fn unwrapped_headers(request: &OutboundContext) -> HashMap<String, String> {
    HashMap::from([
        (
            "Content-Type".to_string(),
            format!("{}; charset={}", mime::CONTENT_TYPE_XML, mime::CHARSET),
        ),
        (
            "SOAPAction".to_string(),
            format!(
                "{}/{}",
                request.interaction.service, request.interaction.action
            ),
        ),
    ])
}

/// How a delivery attempt sequence concluded.
pub(crate) enum DeliveryOutcome {
    /// The backbone took the message and acknowledged it.
    Acked { body: String },
    /// The backbone definitively rejected it; `normalized` is the
    /// loggable, client-facing error payload.
    Rejected { normalized: Value },
}

/// Send with the resolved retry policy: transient failures (retriable
/// fault codes, network errors) are retried up to `retries` times at
/// `retry_interval`; a non-retriable fault short-circuits immediately.
pub(crate) async fn send_reliably(
    engine: &WorkflowEngine,
    request: &OutboundContext,
    url: &str,
    headers: &HashMap<String, String>,
    body: &str,
    reliability: &ReliabilityDetails,
) -> Result<DeliveryOutcome, WorkflowError> {
    let max_attempts = reliability.retries + 1;

    for attempt in 1..=max_attempts {
        log_send_attempt(&request.message_id, url, attempt, max_attempts);

        let response = match engine.transport.post(url, headers, body).await {
            Ok(response) => response,
            Err(transport_error) => {
                if attempt < max_attempts {
                    warn!(
                        message_id = %request.message_id,
                        attempt = attempt,
                        error = %transport_error,
                        "Transport failure, retrying"
                    );
                    tokio::time::sleep(reliability.retry_interval).await;
                    continue;
                }
                return Err(transport_error.into());
            }
        };

        if response.status == 500 {
            let classified =
                classify_soap_response(response.status, &response.headers, &response.body)?;
            let SoapClassification::Fault { details } = classified else {
                // classify only passes non-500 responses through.
                unreachable!("HTTP 500 must classify as fault or raise");
            };
            if details.is_retriable() && attempt < max_attempts {
                warn!(
                    message_id = %request.message_id,
                    attempt = attempt,
                    codes = ?details.numeric_codes(),
                    "Retriable SOAP fault, retrying"
                );
                tokio::time::sleep(reliability.retry_interval).await;
                continue;
            }
            return Ok(DeliveryOutcome::Rejected {
                normalized: details.normalized(),
            });
        }

        if response.is_success() {
            let classified =
                classify_ebxml_response(response.status, &response.headers, &response.body)?;
            return Ok(match classified {
                EbxmlClassification::Success { body } => DeliveryOutcome::Acked { body },
                errored @ EbxmlClassification::ErrorList { .. } => DeliveryOutcome::Rejected {
                    normalized: errored.normalized().unwrap_or_else(|| json!({})),
                },
            });
        }

        // Unexpected transport-level status: definitive rejection.
        return Ok(DeliveryOutcome::Rejected {
            normalized: json!({
                "error_message": "unexpected response status from backbone",
                "status": response.status,
                "body": response.body,
            }),
        });
    }

    unreachable!("delivery loop always returns from its final attempt")
}
