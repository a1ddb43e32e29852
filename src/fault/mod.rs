//! # Fault Classification
//!
//! Decides whether a backbone response represents success, a SOAP fault or
//! an ebXML error, and produces a normalized, loggable error payload plus a
//! retriability verdict.
//!
//! The two classifiers inspect different layers of the same HTTP exchange:
//! SOAP faults arrive on HTTP 500, while ebXML-level errors hide inside a
//! nominally successful HTTP 200. Both treat a structurally impossible
//! response (wrong content-type, a 500 that is not a fault) as a contract
//! violation and raise a hard error rather than passing it through.

use std::collections::HashMap;

use serde_json::{json, Value};
use thiserror::Error;

use crate::constants::RETRIABLE_SOAP_FAULT_CODES;
use crate::ebxml::parser::{header_value, soap_part};
use crate::ebxml::xml::{parse_document, XmlElement};
use crate::ebxml::EnvelopeParsingError;

pub use crate::ebxml::ErrorDetail;

/// Raised when a response violates the backbone contract.
#[derive(Error, Debug)]
pub enum FaultClassificationError {
    #[error("unexpected content-type on HTTP 500 response: {found}")]
    UnexpectedContentType { found: String },

    #[error("HTTP 500 response body is not a SOAP fault")]
    NotASoapFault,

    #[error(transparent)]
    Parsing(#[from] EnvelopeParsingError),
}

/// Structured form of a SOAP 1.1 fault with its vendor error list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFaultDetails {
    pub fault_code: String,
    pub fault_string: String,
    pub errors: Vec<ErrorDetail>,
}

impl SoapFaultDetails {
    /// Numeric fault codes carried by the error list entries.
    ///
    /// A code that fails to parse as a number maps to -1, which is outside
    /// the allow-list and therefore never retriable.
    pub fn numeric_codes(&self) -> Vec<i64> {
        self.errors
            .iter()
            .map(|e| e.error_code.trim().parse().unwrap_or(-1))
            .collect()
    }

    pub fn is_retriable(&self) -> bool {
        is_retriable(&self.numeric_codes())
    }

    /// Normalized JSON payload for logging and client responses.
    pub fn normalized(&self) -> Value {
        json!({
            "fault_code": &self.fault_code,
            "fault_string": &self.fault_string,
            "errors": &self.errors,
        })
    }
}

/// Outcome of SOAP-level classification.
#[derive(Debug, Clone)]
pub enum SoapClassification {
    /// Not a fault; the body is passed through untouched.
    Passthrough { body: String },
    Fault { details: SoapFaultDetails },
}

/// Outcome of ebXML-level classification.
#[derive(Debug, Clone)]
pub enum EbxmlClassification {
    /// No error list present; the body is passed through untouched.
    Success { body: String },
    ErrorList { errors: Vec<ErrorDetail> },
}

impl EbxmlClassification {
    pub fn normalized(&self) -> Option<Value> {
        match self {
            EbxmlClassification::Success { .. } => None,
            EbxmlClassification::ErrorList { errors } => Some(json!({ "errors": errors })),
        }
    }
}

/// A response may be retried only when every fault code it carries is in
/// the transient allow-list. One non-transient code anywhere makes the
/// whole response non-retriable, even alongside retriable codes.
pub fn is_retriable(codes: &[i64]) -> bool {
    codes.iter().all(|code| RETRIABLE_SOAP_FAULT_CODES.contains(code))
}

/// Classify an HTTP response at the SOAP layer.
///
/// Bodies are only inspected on HTTP 500. A 500 without a `text/xml`
/// content-type, or whose body is not a SOAP fault, indicates the backbone
/// broke its own contract and is raised as a hard error.
pub fn classify_soap_response(
    status: u16,
    headers: &HashMap<String, String>,
    body: &str,
) -> Result<SoapClassification, FaultClassificationError> {
    if status != 500 {
        return Ok(SoapClassification::Passthrough {
            body: body.to_string(),
        });
    }

    let content_type = header_value(headers, "content-type").unwrap_or_default();
    if !content_type.to_lowercase().contains("text/xml") {
        return Err(FaultClassificationError::UnexpectedContentType {
            found: content_type,
        });
    }

    let document = parse_document(body)?;
    let fault = document
        .descendant("Fault")
        .ok_or(FaultClassificationError::NotASoapFault)?;

    let fault_code = fault.text_of("faultcode").unwrap_or_default();
    let fault_string = fault.text_of("faultstring").unwrap_or_default();
    if fault_code.is_empty() && fault_string.is_empty() {
        return Err(FaultClassificationError::NotASoapFault);
    }

    let mut entries = Vec::new();
    fault.descendants("error", &mut entries);
    let errors = entries.into_iter().map(vendor_error).collect();

    Ok(SoapClassification::Fault {
        details: SoapFaultDetails {
            fault_code,
            fault_string,
            errors,
        },
    })
}

/// Classify an HTTP response at the ebXML layer.
///
/// Bodies are only inspected on HTTP 200, because the backbone reports
/// ebXML-level errors inside a nominally successful response. An empty body
/// is definite success; a body without an `ErrorList` element is not an
/// error and passes through unchanged.
pub fn classify_ebxml_response(
    status: u16,
    headers: &HashMap<String, String>,
    body: &str,
) -> Result<EbxmlClassification, FaultClassificationError> {
    if status != 200 || body.trim().is_empty() {
        return Ok(EbxmlClassification::Success {
            body: body.to_string(),
        });
    }

    let document = parse_document(&soap_part(headers, body)?)?;
    let error_list = match document.descendant("ErrorList") {
        Some(element) => element,
        None => {
            return Ok(EbxmlClassification::Success {
                body: body.to_string(),
            })
        }
    };

    let mut entries = Vec::new();
    error_list.descendants("Error", &mut entries);
    let errors = entries.into_iter().map(ebxml_error).collect();

    Ok(EbxmlClassification::ErrorList { errors })
}

/// Error entry in a SOAP fault detail: vendor schema with child elements.
fn vendor_error(element: &XmlElement) -> ErrorDetail {
    ErrorDetail {
        code_context: element.text_of("codeContext").unwrap_or_default(),
        error_code: element.text_of("errorCode").unwrap_or_default(),
        severity: element.text_of("severity").unwrap_or_default(),
        location: element.text_of("location").filter(|t| !t.is_empty()),
        description: element.text_of("description").unwrap_or_default(),
    }
}

/// Error entry in an ebXML ErrorList: attribute-carried fields.
fn ebxml_error(element: &XmlElement) -> ErrorDetail {
    ErrorDetail {
        code_context: element.attribute("codeContext").unwrap_or_default().to_string(),
        error_code: element.attribute("errorCode").unwrap_or_default().to_string(),
        severity: element.attribute("severity").unwrap_or_default().to_string(),
        location: element.attribute("location").map(str::to_string),
        description: element.text_of("Description").unwrap_or_default(),
    }
}
