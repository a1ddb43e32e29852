//! End-to-end workflow scenarios over scripted transport, static
//! directory and in-memory persistence.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use mhs_core::config::MhsConfig;
use mhs_core::models::{OutboundStatus, WorkDescriptionRepository};
use mhs_core::persistence::{InMemoryStore, RetryConfig, RetryingStore, Store};
use mhs_core::registry::InteractionRegistry;
use mhs_core::routing::{DirectoryEntry, RoutingResolver, SdsDirectory, StaticDirectory};
use mhs_core::transport::{OutboundTransport, TransportError, TransportResponse};
use mhs_core::workflow::{OutboundContext, WorkflowEngine, WorkflowError};

#[derive(Debug, Clone)]
struct RecordedRequest {
    url: String,
    headers: HashMap<String, String>,
    body: String,
}

/// Returns pre-scripted responses in order and records every request.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    fn scripted(responses: Vec<TransportResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutboundTransport for ScriptedTransport {
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &str,
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers: headers.clone(),
            body: body.to_string(),
        });
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport called more times than scripted"))
    }
}

fn xml_response(status: u16, body: &str) -> TransportResponse {
    TransportResponse {
        status,
        headers: HashMap::from([(
            "Content-Type".to_string(),
            "text/xml; charset=UTF-8".to_string(),
        )]),
        body: body.to_string(),
    }
}

fn soap_fault(code: &str) -> TransportResponse {
    let body = format!(
        r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:nasp="http://national.carerecords.nhs.uk/schema/">
             <SOAP-ENV:Body>
               <SOAP-ENV:Fault>
                 <faultcode>SOAP-ENV:Server</faultcode>
                 <faultstring>Application Exception</faultstring>
                 <detail>
                   <nasp:errorList>
                     <nasp:error>
                       <nasp:errorCode>{code}</nasp:errorCode>
                       <nasp:severity>Error</nasp:severity>
                       <nasp:codeContext>urn:nhs:names:error:tms</nasp:codeContext>
                       <nasp:description>System failure to process message</nasp:description>
                     </nasp:error>
                   </nasp:errorList>
                 </detail>
               </SOAP-ENV:Fault>
             </SOAP-ENV:Body>
           </SOAP-ENV:Envelope>"#
    );
    xml_response(500, &body)
}

/// Directory pre-loaded with both query stages for one interaction.
fn directory_for(org_code: &str, interaction_id: &str, endpoint_url: &str) -> StaticDirectory {
    let mut directory = StaticDirectory::new();

    let mut accredited = DirectoryEntry::default();
    accredited.attributes.insert(
        "nhsMhsPartyKey".to_string(),
        vec!["YES-0000806".to_string()],
    );
    directory.insert(
        &format!("(&(nhsIDCode={org_code})(objectClass=nhsAs)(nhsAsSvcIA={interaction_id}))"),
        accredited,
    );

    let mut record = DirectoryEntry::default();
    for (attribute, value) in [
        ("nhsMhsFQDN", "msg.spine.nhs.uk"),
        ("nhsMHSEndPoint", endpoint_url),
        ("nhsMhsPartyKey", "YES-0000806"),
        ("nhsMhsCPAId", "S1001A1630"),
        ("nhsMHSSyncReplyMode", "MSHSignalsOnly"),
        ("nhsMHSRetries", "2"),
        ("nhsMHSRetryInterval", "PT0S"),
        ("nhsMHSPersistDuration", "PT7M"),
        ("nhsMHSAckRequested", "always"),
        ("nhsMHSDuplicateElimination", "always"),
    ] {
        record
            .attributes
            .insert(attribute.to_string(), vec![value.to_string()]);
    }
    directory.insert(
        &format!(
            "(&(nhsMhsPartyKey=YES-0000806)(objectClass=nhsMhs)(nhsMhsSvcIA={interaction_id}))"
        ),
        record,
    );
    directory
}

struct Harness {
    engine: WorkflowEngine,
    transport: Arc<ScriptedTransport>,
    work_descriptions: WorkDescriptionRepository,
}

fn harness(
    directory: StaticDirectory,
    responses: Vec<TransportResponse>,
) -> Harness {
    let config = MhsConfig {
        party_key: "A91461-9199094".to_string(),
        asid: "123456789012".to_string(),
        ..MhsConfig::default()
    };
    let store: Arc<dyn Store> = Arc::new(RetryingStore::new(
        InMemoryStore::new("message_id"),
        RetryConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(1),
        },
    ));
    let transport = ScriptedTransport::scripted(responses);
    let resolver = Arc::new(RoutingResolver::with_ttl_cache(
        SdsDirectory::new(Arc::new(directory), 2),
        Duration::from_secs(900),
    ));
    let work_descriptions = WorkDescriptionRepository::new(store);
    Harness {
        engine: WorkflowEngine::new(
            config,
            resolver,
            transport.clone(),
            work_descriptions.clone(),
        ),
        transport,
        work_descriptions,
    }
}

fn outbound(interaction_id: &str, message_id: &str, payload: &str) -> OutboundContext {
    let registry = InteractionRegistry::defaults();
    OutboundContext {
        message_id: message_id.to_string(),
        correlation_id: "10F5A436-1913-43F0-9F18-95EA0E43E61A".to_string(),
        ods_code: "X26".to_string(),
        from_asid: Some("123456789012".to_string()),
        payload: payload.to_string(),
        interaction: registry.lookup(interaction_id).unwrap().clone(),
    }
}

async fn outbound_status(harness: &Harness, message_id: &str) -> OutboundStatus {
    harness
        .work_descriptions
        .get(message_id)
        .await
        .unwrap()
        .unwrap()
        .outbound_status
}

#[tokio::test]
async fn test_synchronous_happy_path() {
    let pds_response = "<QUPA_IN050000UK32><nhsNumber>9691035456</nhsNumber></QUPA_IN050000UK32>";
    let harness = harness(
        directory_for("X26", "QUPA_IN040000UK32", "https://pds.spine.nhs.uk/sync"),
        vec![xml_response(200, pds_response)],
    );

    let request = outbound(
        "QUPA_IN040000UK32",
        "0CDBA95F-74DA-47E9-8383-7B8E9167D146",
        "<QUPA_IN040000UK32><nhsNumber>9691035456</nhsNumber></QUPA_IN040000UK32>",
    );
    let response = harness.engine.handle_outbound(request).await.unwrap();

    // Backbone response passed through unchanged.
    assert_eq!(response.http_status, 200);
    assert_eq!(response.body, pds_response);
    assert_eq!(
        outbound_status(&harness, "0CDBA95F-74DA-47E9-8383-7B8E9167D146").await,
        OutboundStatus::SyncResponseSuccessful
    );

    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://pds.spine.nhs.uk/sync");
    // Synchronous sends carry the raw payload, no ebXML wrapper.
    assert!(requests[0].body.starts_with("<QUPA_IN040000UK32>"));
    assert_eq!(
        requests[0].headers.get("SOAPAction").unwrap(),
        "urn:nhs:names:services:pdsquery/QUPA_IN040000UK32"
    );
}

#[tokio::test]
async fn test_async_reliable_retries_transient_fault_then_succeeds() {
    let harness = harness(
        directory_for("X26", "REPC_IN150016UK05", "https://msg.spine.nhs.uk/reliable"),
        vec![
            soap_fault("200"),
            soap_fault("200"),
            xml_response(200, ""),
        ],
    );

    let request = outbound(
        "REPC_IN150016UK05",
        "20B8D482-A95E-4E93-92EA-B1B13C22F4B0",
        "<REPC_IN150016UK05/>",
    );
    let response = harness.engine.handle_outbound(request).await.unwrap();

    assert_eq!(response.http_status, 202);
    assert_eq!(
        outbound_status(&harness, "20B8D482-A95E-4E93-92EA-B1B13C22F4B0").await,
        OutboundStatus::Ackd
    );

    // Resolved retry count of 2 permits exactly three attempts.
    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 3);
    // Every attempt sent the same wrapped message.
    assert!(requests[0].body.contains("<eb:MessageHeader"));
    assert!(requests[0].body.contains("<eb:DuplicateElimination/>"));
    assert!(requests[0].body.contains("<eb:AckRequested"));
    assert_eq!(requests[0].body, requests[2].body);
}

#[tokio::test]
async fn test_async_reliable_non_retriable_fault_short_circuits() {
    let harness = harness(
        directory_for("X26", "REPC_IN150016UK05", "https://msg.spine.nhs.uk/reliable"),
        vec![soap_fault("300")],
    );

    let request = outbound(
        "REPC_IN150016UK05",
        "5BB171D4-53B4-4E3F-8A1C-27B4A2C5E0A1",
        "<REPC_IN150016UK05/>",
    );
    let response = harness.engine.handle_outbound(request).await.unwrap();

    // One attempt, negative acknowledgement, normalized fault surfaced.
    assert_eq!(harness.transport.requests().len(), 1);
    assert_eq!(response.http_status, 500);
    assert!(response.body.contains("Application Exception"));
    assert!(response.body.contains("\"errorCode\":\"300\""));
    assert_eq!(
        outbound_status(&harness, "5BB171D4-53B4-4E3F-8A1C-27B4A2C5E0A1").await,
        OutboundStatus::Nackd
    );
}

#[tokio::test]
async fn test_async_express_sends_once_and_persists_sent() {
    let harness = harness(
        directory_for("X26", "MCCI_IN010000UK13", "https://msg.spine.nhs.uk/express"),
        vec![xml_response(202, "")],
    );

    let request = outbound(
        "MCCI_IN010000UK13",
        "7E2B9D05-9D5C-45B8-9A2E-4F0E8B1C6D3A",
        "<MCCI_IN010000UK13/>",
    );
    let response = harness.engine.handle_outbound(request).await.unwrap();

    assert_eq!(response.http_status, 202);
    assert_eq!(harness.transport.requests().len(), 1);
    assert_eq!(
        outbound_status(&harness, "7E2B9D05-9D5C-45B8-9A2E-4F0E8B1C6D3A").await,
        OutboundStatus::Sent
    );
}

#[tokio::test]
async fn test_forward_reliable_routes_via_intermediary_org_code() {
    // Routing is registered under the Spine intermediary org code, not the
    // recipient's; resolution against the recipient would find nothing.
    let harness = harness(
        directory_for("YES", "COPC_IN000001UK01", "https://msg.spine.nhs.uk/forward"),
        vec![xml_response(200, "")],
    );

    let request = outbound(
        "COPC_IN000001UK01",
        "9C1D2E3F-4A5B-4C6D-8E7F-0A1B2C3D4E5F",
        "<COPC_IN000001UK01/>",
    );
    let response = harness.engine.handle_outbound(request).await.unwrap();

    assert_eq!(response.http_status, 202);
    assert_eq!(
        harness.transport.requests()[0].url,
        "https://msg.spine.nhs.uk/forward"
    );
    assert_eq!(
        outbound_status(&harness, "9C1D2E3F-4A5B-4C6D-8E7F-0A1B2C3D4E5F").await,
        OutboundStatus::Ackd
    );
}

#[tokio::test]
async fn test_routing_failure_persists_preparation_failed() {
    // Empty directory: resolution fails before anything is sent.
    let harness = harness(StaticDirectory::new(), vec![]);

    let request = outbound(
        "REPC_IN150016UK05",
        "1A2B3C4D-5E6F-4A8B-9C0D-1E2F3A4B5C6D",
        "<REPC_IN150016UK05/>",
    );
    let err = harness.engine.handle_outbound(request).await.unwrap_err();

    assert_eq!(err.client_status(), 404);
    assert!(matches!(err, WorkflowError::Routing(_)));
    assert!(harness.transport.requests().is_empty());
    assert_eq!(
        outbound_status(&harness, "1A2B3C4D-5E6F-4A8B-9C0D-1E2F3A4B5C6D").await,
        OutboundStatus::PreparationFailed
    );
}

#[tokio::test]
async fn test_sync_fault_persists_failed_and_returns_normalized_body() {
    let harness = harness(
        directory_for("X26", "QUPA_IN040000UK32", "https://pds.spine.nhs.uk/sync"),
        vec![soap_fault("300")],
    );

    let request = outbound(
        "QUPA_IN040000UK32",
        "6F5E4D3C-2B1A-4098-8765-4321FEDCBA98",
        "<QUPA_IN040000UK32/>",
    );
    let response = harness.engine.handle_outbound(request).await.unwrap();

    assert_eq!(response.http_status, 500);
    assert!(response.body.contains("\"fault_code\":\"SOAP-ENV:Server\""));
    assert_eq!(
        outbound_status(&harness, "6F5E4D3C-2B1A-4098-8765-4321FEDCBA98").await,
        OutboundStatus::SyncResponseFailed
    );
}
