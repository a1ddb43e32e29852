//! Decoding of inbound acknowledgements and ebXML requests.

use std::collections::HashMap;

use super::envelope::Envelope;
use super::errors::EnvelopeParsingError;
use super::xml::{parse_document, XmlElement};

/// Fields extracted from an acknowledgement envelope.
///
/// `received_message_timestamp` is the original timestamp of the message
/// being acknowledged, as reported inside `eb:Acknowledgment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAck {
    pub from_party_id: String,
    pub to_party_id: String,
    pub cpa_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub ref_to_message_id: String,
    pub received_message_timestamp: String,
}

/// Parse an acknowledgement from its HTTP headers and body.
///
/// The body may be a bare SOAP document or the first part of a
/// multipart/related message; the content-type header decides which.
pub fn parse_ack(
    headers: &HashMap<String, String>,
    body: &str,
) -> Result<ParsedAck, EnvelopeParsingError> {
    let document = parse_document(&soap_part(headers, body)?)?;
    let header = message_header(&document)?;

    let acknowledgment =
        document
            .descendant("Acknowledgment")
            .ok_or(EnvelopeParsingError::MissingElement {
                element: "Acknowledgment",
            })?;

    Ok(ParsedAck {
        from_party_id: party_id(header, "From")?,
        to_party_id: party_id(header, "To")?,
        cpa_id: required_text(header, "CPAId")?,
        conversation_id: required_text(header, "ConversationId")?,
        message_id: required_text(header, "MessageId")?,
        ref_to_message_id: required_text(acknowledgment, "RefToMessageId")?,
        received_message_timestamp: required_text(acknowledgment, "Timestamp")?,
    })
}

/// Parse a full request envelope from its HTTP headers and body.
///
/// Reverses [`super::builder::build_request`]: the first MIME part supplies
/// the header fields and flags, the second becomes the payload.
pub fn parse_request(
    headers: &HashMap<String, String>,
    body: &str,
) -> Result<Envelope, EnvelopeParsingError> {
    let content_type =
        header_value(headers, "content-type").ok_or(EnvelopeParsingError::MalformedMime {
            message: "missing content-type header".to_string(),
        })?;
    let parts = split_mime_parts(&content_type, body)?;
    if parts.len() < 2 {
        return Err(EnvelopeParsingError::MalformedMime {
            message: format!("expected header and payload parts, found {}", parts.len()),
        });
    }

    let document = parse_document(&parts[0])?;
    let header = message_header(&document)?;

    let ack_requested = document.descendant("AckRequested");

    Ok(Envelope {
        from_party_id: party_id(header, "From")?,
        to_party_id: party_id(header, "To")?,
        cpa_id: required_text(header, "CPAId")?,
        conversation_id: required_text(header, "ConversationId")?,
        service: required_text(header, "Service")?,
        action: required_text(header, "Action")?,
        message_id: Some(required_text(header, "MessageId")?),
        ref_to_message_id: header.text_of("RefToMessageId").filter(|t| !t.is_empty()),
        timestamp: Some(required_text(header, "Timestamp")?),
        duplicate_elimination: header.descendant("DuplicateElimination").is_some(),
        ack_requested: ack_requested.is_some(),
        ack_soap_actor: ack_requested
            .and_then(|e| e.attribute("actor"))
            .unwrap_or_default()
            .to_string(),
        sync_reply: document.descendant("SyncReply").is_some(),
        payload: Some(parts[1].clone()),
    })
}

/// Split a multipart/related body into its decoded parts.
///
/// Part headers are discarded; the returned strings are the part bodies in
/// document order.
pub(crate) fn split_mime_parts(
    content_type: &str,
    body: &str,
) -> Result<Vec<String>, EnvelopeParsingError> {
    let boundary = content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|value| value.trim_matches('"'))
        .ok_or_else(|| EnvelopeParsingError::MalformedMime {
            message: "content-type has no boundary parameter".to_string(),
        })?;

    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    for section in body.split(delimiter.as_str()).skip(1) {
        // The closing delimiter leaves "--" plus any epilogue.
        if section.starts_with("--") {
            break;
        }
        let content = match section.split_once("\r\n\r\n") {
            Some((_part_headers, content)) => content,
            None => section
                .split_once("\n\n")
                .map(|(_, content)| content)
                .ok_or_else(|| EnvelopeParsingError::MalformedMime {
                    message: "part has no header/body separator".to_string(),
                })?,
        };
        parts.push(content.trim_end_matches(['\r', '\n']).to_string());
    }

    if parts.is_empty() {
        return Err(EnvelopeParsingError::MalformedMime {
            message: "no parts between boundaries".to_string(),
        });
    }
    Ok(parts)
}

/// Extract the SOAP document from a possibly-multipart body.
pub(crate) fn soap_part(
    headers: &HashMap<String, String>,
    body: &str,
) -> Result<String, EnvelopeParsingError> {
    match header_value(headers, "content-type") {
        Some(content_type) if content_type.to_lowercase().starts_with("multipart/related") => {
            let parts = split_mime_parts(&content_type, body)?;
            Ok(parts[0].clone())
        }
        _ => Ok(body.to_string()),
    }
}

fn message_header(document: &XmlElement) -> Result<&XmlElement, EnvelopeParsingError> {
    document
        .descendant("MessageHeader")
        .ok_or(EnvelopeParsingError::MissingElement {
            element: "MessageHeader",
        })
}

fn party_id(header: &XmlElement, side: &'static str) -> Result<String, EnvelopeParsingError> {
    header
        .child(side)
        .and_then(|e| e.text_of("PartyId"))
        .filter(|t| !t.is_empty())
        .ok_or(EnvelopeParsingError::MissingElement { element: "PartyId" })
}

fn required_text(
    element: &XmlElement,
    name: &'static str,
) -> Result<String, EnvelopeParsingError> {
    element
        .text_of(name)
        .filter(|t| !t.is_empty())
        .ok_or(EnvelopeParsingError::MissingElement { element: name })
}

pub(crate) fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACK_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:eb="http://www.oasis-open.org/committees/ebxml-msg/schema/msg-header-2_0.xsd">
  <soap:Header>
    <eb:MessageHeader eb:version="2.0" soap:mustUnderstand="1">
      <eb:From><eb:PartyId eb:type="urn:nhs:names:partyType:ocs+serviceInstance">YES-0000806</eb:PartyId></eb:From>
      <eb:To><eb:PartyId eb:type="urn:nhs:names:partyType:ocs+serviceInstance">A91461-9199094</eb:PartyId></eb:To>
      <eb:CPAId>S1001A1630</eb:CPAId>
      <eb:ConversationId>10F5A436-1913-43F0-9F18-95EA0E43E61A</eb:ConversationId>
      <eb:Service>urn:oasis:names:tc:ebxml-msg:service</eb:Service>
      <eb:Action>Acknowledgment</eb:Action>
      <eb:MessageData>
        <eb:MessageId>20B8D482-A95E-4E93-92EA-B1B13C22F4B0</eb:MessageId>
        <eb:Timestamp>2019-05-04T20:55:16Z</eb:Timestamp>
      </eb:MessageData>
    </eb:MessageHeader>
    <eb:Acknowledgment eb:version="2.0" soap:mustUnderstand="1" soap:actor="urn:oasis:names:tc:ebxml-msg:actor:toPartyMSH">
      <eb:Timestamp>2019-05-04T20:55:01Z</eb:Timestamp>
      <eb:RefToMessageId>0CDBA95F-74DA-47E9-8383-7B8E9167D146</eb:RefToMessageId>
    </eb:Acknowledgment>
  </soap:Header>
  <soap:Body/>
</soap:Envelope>"#;

    fn xml_headers() -> HashMap<String, String> {
        HashMap::from([(
            "Content-Type".to_string(),
            "text/xml; charset=UTF-8".to_string(),
        )])
    }

    #[test]
    fn test_parse_ack_extracts_all_fields() {
        let ack = parse_ack(&xml_headers(), ACK_BODY).unwrap();
        assert_eq!(ack.from_party_id, "YES-0000806");
        assert_eq!(ack.to_party_id, "A91461-9199094");
        assert_eq!(ack.cpa_id, "S1001A1630");
        assert_eq!(ack.conversation_id, "10F5A436-1913-43F0-9F18-95EA0E43E61A");
        assert_eq!(ack.message_id, "20B8D482-A95E-4E93-92EA-B1B13C22F4B0");
        assert_eq!(
            ack.ref_to_message_id,
            "0CDBA95F-74DA-47E9-8383-7B8E9167D146"
        );
        assert_eq!(ack.received_message_timestamp, "2019-05-04T20:55:01Z");
    }

    #[test]
    fn test_parse_ack_rejects_missing_acknowledgment() {
        let start = ACK_BODY.find("<eb:Acknowledgment").unwrap();
        let end = ACK_BODY.find("</eb:Acknowledgment>").unwrap() + "</eb:Acknowledgment>".len();
        let body = format!("{}{}", &ACK_BODY[..start], &ACK_BODY[end..]);
        let err = parse_ack(&xml_headers(), &body).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeParsingError::MissingElement {
                element: "Acknowledgment"
            }
        ));
    }

    #[test]
    fn test_parse_ack_rejects_missing_cpa_id() {
        let body = ACK_BODY.replace("<eb:CPAId>S1001A1630</eb:CPAId>", "");
        let err = parse_ack(&xml_headers(), &body).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeParsingError::MissingElement { element: "CPAId" }
        ));
    }

    #[test]
    fn test_parse_ack_rejects_non_xml_body() {
        let err = parse_ack(&xml_headers(), "not xml at all").unwrap_err();
        assert!(matches!(err, EnvelopeParsingError::MalformedXml { .. }));
    }

    #[test]
    fn test_split_mime_parts() {
        let content_type = r#"multipart/related; boundary="the-boundary"; type="text/xml""#;
        let body = "--the-boundary\r\nContent-Id: <a>\r\nContent-Type: text/xml\r\n\r\n<first/>\r\n--the-boundary\r\nContent-Id: <b>\r\n\r\n<second/>\r\n--the-boundary--";
        let parts = split_mime_parts(content_type, body).unwrap();
        assert_eq!(parts, vec!["<first/>".to_string(), "<second/>".to_string()]);
    }

    #[test]
    fn test_split_mime_parts_requires_boundary() {
        let err = split_mime_parts("multipart/related", "body").unwrap_err();
        assert!(matches!(err, EnvelopeParsingError::MalformedMime { .. }));
    }
}
