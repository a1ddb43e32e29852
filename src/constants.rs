//! # System Constants
//!
//! Wire-level constants and operational defaults shared across the MHS
//! core: SOAP/ebXML namespaces, MIME layout of outbound messages, the
//! retriable fault-code allow-list and default cache/retry settings.

/// XML namespaces used by the envelope codec and the fault classifier.
pub mod namespaces {
    pub const SOAP: &str = "http://schemas.xmlsoap.org/soap/envelope/";
    pub const EBXML: &str =
        "http://www.oasis-open.org/committees/ebxml-msg/schema/msg-header-2_0.xsd";
    pub const XLINK: &str = "http://www.w3.org/1999/xlink";

    /// Party id qualifier used on `eb:PartyId` elements.
    pub const PARTY_TYPE: &str = "urn:nhs:names:partyType:ocs+serviceInstance";

    /// Service and actions reserved for ebXML-level signals.
    pub const EBXML_SERVICE: &str = "urn:oasis:names:tc:ebxml-msg:service";
    pub const EBXML_ACTION_ACK: &str = "Acknowledgment";
    pub const EBXML_ACTION_ERROR: &str = "MessageError";

    /// SOAP actor the backbone addresses acknowledgements to.
    pub const ACK_SOAP_ACTOR: &str = "urn:oasis:names:tc:ebxml-msg:actor:toPartyMSH";
    pub const NEXT_MSH_ACTOR: &str = "http://schemas.xmlsoap.org/soap/actor/next";
}

/// MIME layout of outbound multipart messages.
pub mod mime {
    pub const BOUNDARY: &str = "--=_MIME-Boundary";
    pub const EBXML_PART_ID: &str = "<ebXMLHeader@mhs>";
    pub const PAYLOAD_PART_ID: &str = "<Payload@mhs>";
    pub const CONTENT_TYPE_XML: &str = "text/xml";
    pub const CHARSET: &str = "UTF-8";
}

/// SOAP fault codes the backbone reports for transient conditions.
///
/// 200 is a generic processing failure, 206 a routing or delivery failure
/// and 208 a memo-store failure. A response may be retried only when every
/// fault code it carries is in this list.
pub const RETRIABLE_SOAP_FAULT_CODES: [i64; 3] = [200, 206, 208];

/// Operational defaults, overridable through [`crate::config::MhsConfig`].
pub mod defaults {
    /// Routing cache entries expire this long after insertion.
    pub const ROUTING_CACHE_TTL_SECS: u64 = 900;

    /// Sync-async resynchroniser polling bounds.
    pub const RESYNC_MAX_RETRIES: u32 = 20;
    pub const RESYNC_RETRY_INTERVAL_MS: u64 = 1_000;
    pub const RESYNC_INITIAL_DELAY_MS: u64 = 0;

    /// Persistence adaptor retry bounds.
    pub const STORE_MAX_RETRIES: u32 = 3;
    pub const STORE_RETRY_DELAY_MS: u64 = 100;

    /// Cap on concurrently dispatched blocking directory lookups.
    pub const DIRECTORY_POOL_SIZE: usize = 4;

    /// Outbound HTTPS request timeout.
    pub const OUTBOUND_TIMEOUT_SECS: u64 = 60;
}
