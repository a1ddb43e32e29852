//! Forward reliable pattern: identical to asynchronous reliable, but the
//! message is addressed through the Spine intermediary relay, so routing
//! and reliability are resolved against the configured intermediary org
//! code rather than the final recipient's.

use super::{async_reliable, OutboundContext, WorkflowEngine, WorkflowError, WorkflowResponse};

pub(crate) async fn handle(
    engine: &WorkflowEngine,
    request: &OutboundContext,
) -> Result<WorkflowResponse, WorkflowError> {
    let relay_org_code = engine.config.spine_org_code.clone();
    async_reliable::run(engine, request, &relay_org_code).await
}
