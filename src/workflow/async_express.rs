//! Asynchronous express pattern: wrap, send once, expect only a
//! transport-level acknowledgement. The substantive reply arrives later
//! through the inbound receiver and updates the inbound status
//! independently.

use tracing::warn;

use crate::ebxml::build_request;
use crate::fault::{
    classify_ebxml_response, classify_soap_response, EbxmlClassification, SoapClassification,
};
use crate::models::OutboundStatus;
use crate::transport::TransportResponse;

use super::common::{delivery_url, prepare_step, request_envelope};
use super::{OutboundContext, WorkflowEngine, WorkflowError, WorkflowResponse};

pub(crate) async fn handle(
    engine: &WorkflowEngine,
    request: &OutboundContext,
) -> Result<WorkflowResponse, WorkflowError> {
    let message_id = &request.message_id;
    let work_descriptions = &engine.work_descriptions;

    prepare_step(
        engine,
        message_id,
        work_descriptions
            .set_outbound_status(message_id, OutboundStatus::Preparing)
            .await,
    )
    .await?;

    let endpoint = prepare_step(
        engine,
        message_id,
        engine
            .resolver
            .endpoint(&request.ods_code, &request.interaction.interaction_id)
            .await,
    )
    .await?;
    let url = prepare_step(engine, message_id, delivery_url(&endpoint, request)).await?;

    let envelope = request_envelope(engine, request, &endpoint, None);
    let built = prepare_step(engine, message_id, build_request(&envelope)).await?;

    let response = match engine
        .transport
        .post(&url, &built.headers, &built.body)
        .await
    {
        Ok(response) => response,
        Err(transport_error) => {
            nack(engine, message_id).await;
            return Err(transport_error.into());
        }
    };

    conclude(engine, request, response).await
}

/// Map the single transport outcome onto SENT or NACKD.
async fn conclude(
    engine: &WorkflowEngine,
    request: &OutboundContext,
    response: TransportResponse,
) -> Result<WorkflowResponse, WorkflowError> {
    let message_id = &request.message_id;

    if response.is_success() {
        match classify_ebxml_response(response.status, &response.headers, &response.body) {
            Ok(EbxmlClassification::Success { .. }) => {
                engine
                    .work_descriptions
                    .set_outbound_status(message_id, OutboundStatus::Sent)
                    .await?;
                return Ok(WorkflowResponse {
                    http_status: 202,
                    body: String::new(),
                });
            }
            Ok(errored @ EbxmlClassification::ErrorList { .. }) => {
                nack(engine, message_id).await;
                return Ok(WorkflowResponse {
                    http_status: 500,
                    body: errored
                        .normalized()
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                });
            }
            Err(contract_violation) => {
                nack(engine, message_id).await;
                return Err(contract_violation.into());
            }
        }
    }

    if response.status == 500 {
        match classify_soap_response(response.status, &response.headers, &response.body) {
            Ok(SoapClassification::Fault { details }) => {
                nack(engine, message_id).await;
                return Ok(WorkflowResponse {
                    http_status: 500,
                    body: details.normalized().to_string(),
                });
            }
            Ok(SoapClassification::Passthrough { .. }) => {
                unreachable!("HTTP 500 must classify as fault or raise")
            }
            Err(contract_violation) => {
                nack(engine, message_id).await;
                return Err(contract_violation.into());
            }
        }
    }

    nack(engine, message_id).await;
    Ok(WorkflowResponse {
        http_status: response.status,
        body: response.body,
    })
}

async fn nack(engine: &WorkflowEngine, message_id: &str) {
    if let Err(e) = engine
        .work_descriptions
        .set_outbound_status(message_id, OutboundStatus::Nackd)
        .await
    {
        warn!(
            message_id = %message_id,
            error = %e,
            "Failed to record negative acknowledgement"
        );
    }
}
