//! Wire-form rendering for requests, acknowledgements and negative
//! acknowledgements.
//!
//! The templates are fixed: every outbound message is rendered from the
//! same grammar, with required fields checked up front so an incomplete
//! envelope can never leave the process.

use std::collections::HashMap;
use std::fmt::Write;

use chrono::Utc;
use uuid::Uuid;

use crate::constants::{mime, namespaces};

use super::envelope::{Envelope, ErrorDetail};
use super::errors::MessageGenerationError;

/// A rendered outbound message: generated id, HTTP headers and body.
#[derive(Debug, Clone)]
pub struct BuiltMessage {
    pub message_id: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Render a request envelope to multipart MIME wire form.
///
/// Generates `message_id` and `timestamp` when the envelope does not carry
/// them. The payload travels as the second MIME part, referenced from the
/// ebXML manifest in the first.
pub fn build_request(envelope: &Envelope) -> Result<BuiltMessage, MessageGenerationError> {
    let payload = envelope
        .payload
        .as_deref()
        .ok_or(MessageGenerationError::MissingField { field: "payload" })?;
    let message_id = resolve_message_id(envelope);
    let timestamp = resolve_timestamp(envelope);

    let mut soap = String::new();
    writeln!(soap, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        soap,
        r#"<soap:Envelope xmlns:soap="{}" xmlns:eb="{}" xmlns:xlink="{}">"#,
        namespaces::SOAP,
        namespaces::EBXML,
        namespaces::XLINK
    )?;
    writeln!(soap, "  <soap:Header>")?;
    write_message_header(
        &mut soap,
        envelope,
        &message_id,
        &timestamp,
        &envelope.service,
        &envelope.action,
        None,
    )?;
    if envelope.ack_requested {
        let actor = required(&envelope.ack_soap_actor, "ack_soap_actor")?;
        writeln!(
            soap,
            r#"    <eb:AckRequested eb:version="2.0" soap:mustUnderstand="1" soap:actor="{}" eb:signed="false"/>"#,
            escape_xml(actor)
        )?;
    }
    if envelope.sync_reply {
        writeln!(
            soap,
            r#"    <eb:SyncReply eb:version="2.0" soap:mustUnderstand="1" soap:actor="{}"/>"#,
            namespaces::NEXT_MSH_ACTOR
        )?;
    }
    writeln!(soap, "  </soap:Header>")?;
    writeln!(soap, "  <soap:Body>")?;
    writeln!(soap, r#"    <eb:Manifest eb:version="2.0">"#)?;
    writeln!(
        soap,
        r#"      <eb:Reference xlink:href="cid:{}">"#,
        mime::PAYLOAD_PART_ID.trim_matches(['<', '>'])
    )?;
    writeln!(
        soap,
        r#"        <eb:Description xml:lang="en">The HL7 payload</eb:Description>"#
    )?;
    writeln!(soap, "      </eb:Reference>")?;
    writeln!(soap, "    </eb:Manifest>")?;
    writeln!(soap, "  </soap:Body>")?;
    writeln!(soap, "</soap:Envelope>")?;

    let body = assemble_multipart(&soap, payload);
    let mut headers = HashMap::new();
    headers.insert(
        "Content-Type".to_string(),
        format!(
            r#"multipart/related; boundary="{}"; type="{}"; start="{}"; charset={}"#,
            mime::BOUNDARY,
            mime::CONTENT_TYPE_XML,
            mime::EBXML_PART_ID,
            mime::CHARSET
        ),
    );
    headers.insert(
        "SOAPAction".to_string(),
        format!("{}/{}", envelope.service, envelope.action),
    );

    Ok(BuiltMessage {
        message_id,
        headers,
        body,
    })
}

/// Render an acknowledgement for a previously received message.
///
/// `ref_to_message_id` names the acknowledged message and `timestamp` must
/// carry that message's original timestamp.
pub fn build_ack(envelope: &Envelope) -> Result<BuiltMessage, MessageGenerationError> {
    let ref_to = envelope
        .ref_to_message_id
        .as_deref()
        .ok_or(MessageGenerationError::MissingField {
            field: "ref_to_message_id",
        })?;
    let received_timestamp =
        envelope
            .timestamp
            .as_deref()
            .ok_or(MessageGenerationError::MissingField { field: "timestamp" })?;
    let message_id = new_message_id();
    let generated_timestamp = now_timestamp();

    let mut soap = String::new();
    writeln!(soap, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        soap,
        r#"<soap:Envelope xmlns:soap="{}" xmlns:eb="{}">"#,
        namespaces::SOAP,
        namespaces::EBXML
    )?;
    writeln!(soap, "  <soap:Header>")?;
    write_message_header(
        &mut soap,
        envelope,
        &message_id,
        &generated_timestamp,
        namespaces::EBXML_SERVICE,
        namespaces::EBXML_ACTION_ACK,
        Some(ref_to),
    )?;
    writeln!(
        soap,
        r#"    <eb:Acknowledgment eb:version="2.0" soap:mustUnderstand="1" soap:actor="{}">"#,
        namespaces::ACK_SOAP_ACTOR
    )?;
    writeln!(
        soap,
        "      <eb:Timestamp>{}</eb:Timestamp>",
        escape_xml(required(received_timestamp, "timestamp")?)
    )?;
    writeln!(
        soap,
        "      <eb:RefToMessageId>{}</eb:RefToMessageId>",
        escape_xml(required(ref_to, "ref_to_message_id")?)
    )?;
    writeln!(soap, "    </eb:Acknowledgment>")?;
    writeln!(soap, "  </soap:Header>")?;
    writeln!(soap, "  <soap:Body/>")?;
    writeln!(soap, "</soap:Envelope>")?;

    Ok(single_part(message_id, soap, namespaces::EBXML_ACTION_ACK))
}

/// Render a negative acknowledgement carrying an ebXML ErrorList.
pub fn build_nack(
    envelope: &Envelope,
    errors: &[ErrorDetail],
) -> Result<BuiltMessage, MessageGenerationError> {
    let ref_to = envelope
        .ref_to_message_id
        .as_deref()
        .ok_or(MessageGenerationError::MissingField {
            field: "ref_to_message_id",
        })?;
    if errors.is_empty() {
        return Err(MessageGenerationError::MissingField { field: "errors" });
    }
    let message_id = new_message_id();
    let timestamp = now_timestamp();

    let mut soap = String::new();
    writeln!(soap, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        soap,
        r#"<soap:Envelope xmlns:soap="{}" xmlns:eb="{}">"#,
        namespaces::SOAP,
        namespaces::EBXML
    )?;
    writeln!(soap, "  <soap:Header>")?;
    write_message_header(
        &mut soap,
        envelope,
        &message_id,
        &timestamp,
        namespaces::EBXML_SERVICE,
        namespaces::EBXML_ACTION_ERROR,
        Some(ref_to),
    )?;
    writeln!(
        soap,
        r#"    <eb:ErrorList eb:version="2.0" soap:mustUnderstand="1" eb:highestSeverity="Error">"#
    )?;
    for error in errors {
        let location = error
            .location
            .as_deref()
            .map(|l| format!(r#" eb:location="{}""#, escape_xml(l)))
            .unwrap_or_default();
        writeln!(
            soap,
            r#"      <eb:Error eb:errorCode="{}" eb:severity="{}" eb:codeContext="{}"{}>"#,
            escape_xml(&error.error_code),
            escape_xml(&error.severity),
            escape_xml(&error.code_context),
            location
        )?;
        writeln!(
            soap,
            r#"        <eb:Description xml:lang="en">{}</eb:Description>"#,
            escape_xml(&error.description)
        )?;
        writeln!(soap, "      </eb:Error>")?;
    }
    writeln!(soap, "    </eb:ErrorList>")?;
    writeln!(soap, "  </soap:Header>")?;
    writeln!(soap, "  <soap:Body/>")?;
    writeln!(soap, "</soap:Envelope>")?;

    Ok(single_part(message_id, soap, namespaces::EBXML_ACTION_ERROR))
}

#[allow(clippy::too_many_arguments)]
fn write_message_header(
    soap: &mut String,
    envelope: &Envelope,
    message_id: &str,
    timestamp: &str,
    service: &str,
    action: &str,
    ref_to_message_id: Option<&str>,
) -> Result<(), MessageGenerationError> {
    writeln!(
        soap,
        r#"    <eb:MessageHeader eb:version="2.0" soap:mustUnderstand="1">"#
    )?;
    writeln!(
        soap,
        r#"      <eb:From><eb:PartyId eb:type="{}">{}</eb:PartyId></eb:From>"#,
        namespaces::PARTY_TYPE,
        escape_xml(required(&envelope.from_party_id, "from_party_id")?)
    )?;
    writeln!(
        soap,
        r#"      <eb:To><eb:PartyId eb:type="{}">{}</eb:PartyId></eb:To>"#,
        namespaces::PARTY_TYPE,
        escape_xml(required(&envelope.to_party_id, "to_party_id")?)
    )?;
    writeln!(
        soap,
        "      <eb:CPAId>{}</eb:CPAId>",
        escape_xml(required(&envelope.cpa_id, "cpa_id")?)
    )?;
    writeln!(
        soap,
        "      <eb:ConversationId>{}</eb:ConversationId>",
        escape_xml(required(&envelope.conversation_id, "conversation_id")?)
    )?;
    writeln!(
        soap,
        "      <eb:Service>{}</eb:Service>",
        escape_xml(required(service, "service")?)
    )?;
    writeln!(
        soap,
        "      <eb:Action>{}</eb:Action>",
        escape_xml(required(action, "action")?)
    )?;
    writeln!(soap, "      <eb:MessageData>")?;
    writeln!(
        soap,
        "        <eb:MessageId>{}</eb:MessageId>",
        escape_xml(message_id)
    )?;
    writeln!(soap, "        <eb:Timestamp>{}</eb:Timestamp>", escape_xml(timestamp))?;
    if let Some(ref_to) = ref_to_message_id {
        writeln!(
            soap,
            "        <eb:RefToMessageId>{}</eb:RefToMessageId>",
            escape_xml(ref_to)
        )?;
    }
    writeln!(soap, "      </eb:MessageData>")?;
    if envelope.duplicate_elimination {
        writeln!(soap, "      <eb:DuplicateElimination/>")?;
    }
    writeln!(soap, "    </eb:MessageHeader>")?;
    Ok(())
}

fn assemble_multipart(soap: &str, payload: &str) -> String {
    let mut body = String::new();
    for (content_id, content) in [(mime::EBXML_PART_ID, soap), (mime::PAYLOAD_PART_ID, payload)] {
        body.push_str(&format!("--{}\r\n", mime::BOUNDARY));
        body.push_str(&format!("Content-Id: {content_id}\r\n"));
        body.push_str(&format!(
            "Content-Type: {}; charset={}\r\n",
            mime::CONTENT_TYPE_XML,
            mime::CHARSET
        ));
        body.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--", mime::BOUNDARY));
    body
}

fn single_part(message_id: String, soap: String, action: &str) -> BuiltMessage {
    let mut headers = HashMap::new();
    headers.insert(
        "Content-Type".to_string(),
        format!("{}; charset={}", mime::CONTENT_TYPE_XML, mime::CHARSET),
    );
    headers.insert(
        "SOAPAction".to_string(),
        format!("{}/{}", namespaces::EBXML_SERVICE, action),
    );
    BuiltMessage {
        message_id,
        headers,
        body: soap,
    }
}

fn resolve_message_id(envelope: &Envelope) -> String {
    envelope
        .message_id
        .clone()
        .unwrap_or_else(new_message_id)
}

fn resolve_timestamp(envelope: &Envelope) -> String {
    envelope.timestamp.clone().unwrap_or_else(now_timestamp)
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn required<'a>(
    value: &'a str,
    field: &'static str,
) -> Result<&'a str, MessageGenerationError> {
    if value.trim().is_empty() {
        Err(MessageGenerationError::MissingField { field })
    } else {
        Ok(value)
    }
}

pub(crate) fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_envelope() -> Envelope {
        Envelope {
            from_party_id: "A91461-9199094".to_string(),
            to_party_id: "YES-0000806".to_string(),
            cpa_id: "S1001A1630".to_string(),
            conversation_id: "10F5A436-1913-43F0-9F18-95EA0E43E61A".to_string(),
            service: "urn:nhs:names:services:pdsquery".to_string(),
            action: "QUPA_IN000006UK02".to_string(),
            duplicate_elimination: true,
            ack_requested: true,
            sync_reply: true,
            payload: Some("<QUPA_IN000006UK02/>".to_string()),
            ..Envelope::default()
        }
    }

    #[test]
    fn test_build_request_generates_id_and_timestamp() {
        let built = build_request(&request_envelope()).unwrap();
        assert_eq!(built.message_id.len(), 36);
        assert_eq!(built.message_id, built.message_id.to_uppercase());
        assert!(built.body.contains("<eb:MessageId>"));
        assert!(built.body.contains("<eb:Timestamp>"));
    }

    #[test]
    fn test_build_request_honours_supplied_message_id() {
        let mut envelope = request_envelope();
        envelope.message_id = Some("0CDBA95F-74DA-47E9-8383-7B8E9167D146".to_string());
        let built = build_request(&envelope).unwrap();
        assert_eq!(built.message_id, "0CDBA95F-74DA-47E9-8383-7B8E9167D146");
    }

    #[test]
    fn test_build_request_multipart_layout() {
        let built = build_request(&request_envelope()).unwrap();
        let content_type = built.headers.get("Content-Type").unwrap();
        assert!(content_type.starts_with("multipart/related"));
        assert!(content_type.contains("start=\"<ebXMLHeader@mhs>\""));
        assert_eq!(
            built.headers.get("SOAPAction").unwrap(),
            "urn:nhs:names:services:pdsquery/QUPA_IN000006UK02"
        );
        assert!(built.body.contains("<QUPA_IN000006UK02/>"));
        assert!(built.body.ends_with("----=_MIME-Boundary--"));
    }

    #[test]
    fn test_build_request_requires_party_ids() {
        let mut envelope = request_envelope();
        envelope.to_party_id = String::new();
        let err = build_request(&envelope).unwrap_err();
        assert!(
            matches!(err, MessageGenerationError::MissingField { field } if field == "to_party_id")
        );
    }

    #[test]
    fn test_build_request_requires_payload() {
        let mut envelope = request_envelope();
        envelope.payload = None;
        let err = build_request(&envelope).unwrap_err();
        assert!(matches!(err, MessageGenerationError::MissingField { field } if field == "payload"));
    }

    #[test]
    fn test_optional_flags_omitted_when_unset() {
        let mut envelope = request_envelope();
        envelope.duplicate_elimination = false;
        envelope.ack_requested = false;
        envelope.sync_reply = false;
        let built = build_request(&envelope).unwrap();
        assert!(!built.body.contains("DuplicateElimination"));
        assert!(!built.body.contains("AckRequested"));
        assert!(!built.body.contains("SyncReply"));
    }

    #[test]
    fn test_build_ack_requires_reference() {
        let mut envelope = request_envelope();
        envelope.payload = None;
        envelope.timestamp = Some("2019-05-04T20:55:16Z".to_string());
        let err = build_ack(&envelope).unwrap_err();
        assert!(matches!(
            err,
            MessageGenerationError::MissingField {
                field: "ref_to_message_id"
            }
        ));
    }

    #[test]
    fn test_build_nack_renders_error_list() {
        let mut envelope = request_envelope();
        envelope.ref_to_message_id = Some("0CDBA95F-74DA-47E9-8383-7B8E9167D146".to_string());
        let errors = vec![ErrorDetail {
            code_context: "urn:oasis:names:tc:ebxml-msg:service:errors".to_string(),
            error_code: "ValueNotRecognized".to_string(),
            severity: "Error".to_string(),
            location: None,
            description: "501314:Invalid To Party Type attribute".to_string(),
        }];
        let built = build_nack(&envelope, &errors).unwrap();
        assert!(built.body.contains("eb:ErrorList"));
        assert!(built.body.contains(r#"eb:errorCode="ValueNotRecognized""#));
        assert!(built.body.contains("501314:Invalid To Party Type attribute"));
    }

    #[test]
    fn test_xml_escaping_in_field_values() {
        let mut envelope = request_envelope();
        envelope.conversation_id = "a<b&c".to_string();
        let built = build_request(&envelope).unwrap();
        assert!(built.body.contains("<eb:ConversationId>a&lt;b&amp;c</eb:ConversationId>"));
    }
}
