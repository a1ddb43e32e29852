//! Asynchronous reliable pattern: the envelope carries ack-requested and
//! duplicate-elimination flags resolved from the directory, and retriable
//! delivery failures are retried with the resolved count and interval.

use tracing::warn;

use crate::ebxml::build_request;
use crate::models::OutboundStatus;

use super::common::{
    delivery_url, prepare_step, request_envelope, send_reliably, DeliveryOutcome,
};
use super::{OutboundContext, WorkflowEngine, WorkflowError, WorkflowResponse};

pub(crate) async fn handle(
    engine: &WorkflowEngine,
    request: &OutboundContext,
) -> Result<WorkflowResponse, WorkflowError> {
    run(engine, request, &request.ods_code).await
}

/// Shared by the reliable and forward-reliable patterns, which differ only
/// in the org code routing is resolved against.
pub(crate) async fn run(
    engine: &WorkflowEngine,
    request: &OutboundContext,
    route_org_code: &str,
) -> Result<WorkflowResponse, WorkflowError> {
    let message_id = &request.message_id;
    let work_descriptions = &engine.work_descriptions;
    let interaction_id = &request.interaction.interaction_id;

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
        engine.resolver.endpoint(route_org_code, interaction_id).await,
    )
    .await?;
    let reliability = prepare_step(
        engine,
        message_id,
        engine
            .resolver
            .reliability(route_org_code, interaction_id)
            .await,
    )
    .await?;
    let url = prepare_step(engine, message_id, delivery_url(&endpoint, request)).await?;

    let envelope = request_envelope(engine, request, &endpoint, Some(&reliability));
    let built = prepare_step(engine, message_id, build_request(&envelope)).await?;

    let outcome = match send_reliably(
        engine,
        request,
        &url,
        &built.headers,
        &built.body,
        &reliability,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(delivery_error) => {
            nack(engine, message_id).await;
            return Err(delivery_error);
        }
    };

    match outcome {
        DeliveryOutcome::Acked { .. } => {
            work_descriptions
                .set_outbound_status(message_id, OutboundStatus::Ackd)
                .await?;
            Ok(WorkflowResponse {
                http_status: 202,
                body: String::new(),
            })
        }
        DeliveryOutcome::Rejected { normalized } => {
            nack(engine, message_id).await;
            Ok(WorkflowResponse {
                http_status: 500,
                body: normalized.to_string(),
            })
        }
    }
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
