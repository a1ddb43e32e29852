//! Synchronous pattern: one HTTP exchange, no ebXML wrapper, response
//! returned directly to the caller.

use tracing::warn;

use crate::fault::{classify_soap_response, SoapClassification};
use crate::models::OutboundStatus;

use super::common::{delivery_url, prepare_step, unwrapped_headers};
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

    let headers = unwrapped_headers(request);
    let response = match engine.transport.post(&url, &headers, &request.payload).await {
        Ok(response) => response,
        Err(transport_error) => {
            fail(engine, message_id).await;
            return Err(transport_error.into());
        }
    };

    let classified = match classify_soap_response(response.status, &response.headers, &response.body)
    {
        Ok(classified) => classified,
        Err(contract_violation) => {
            fail(engine, message_id).await;
            return Err(contract_violation.into());
        }
    };

    match classified {
        SoapClassification::Fault { details } => {
            fail(engine, message_id).await;
            Ok(WorkflowResponse {
                http_status: 500,
                body: details.normalized().to_string(),
            })
        }
        SoapClassification::Passthrough { body } if response.is_success() => {
            work_descriptions
                .set_outbound_status(message_id, OutboundStatus::SyncResponseSuccessful)
                .await?;
            Ok(WorkflowResponse {
                http_status: 200,
                body,
            })
        }
        SoapClassification::Passthrough { body } => {
            fail(engine, message_id).await;
            Ok(WorkflowResponse {
                http_status: response.status,
                body,
            })
        }
    }
}

/// Terminal failure for the synchronous pattern. Failures after the send
/// resolve to `SYNC_RESPONSE_FAILED`, never `PREPARATION_FAILED`.
async fn fail(engine: &WorkflowEngine, message_id: &str) {
    if let Err(e) = engine
        .work_descriptions
        .set_outbound_status(message_id, OutboundStatus::SyncResponseFailed)
        .await
    {
        warn!(
            message_id = %message_id,
            error = %e,
            "Failed to record synchronous response failure"
        );
    }
}
