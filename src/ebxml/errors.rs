use thiserror::Error;

/// Raised when an envelope cannot be rendered to its wire form.
#[derive(Error, Debug)]
pub enum MessageGenerationError {
    #[error("required envelope field {field} is missing")]
    MissingField { field: &'static str },

    #[error("envelope rendering failed: {0}")]
    Render(#[from] std::fmt::Error),
}

/// Raised when an inbound wire message cannot be decoded.
#[derive(Error, Debug)]
pub enum EnvelopeParsingError {
    #[error("malformed XML: {message}")]
    MalformedXml { message: String },

    #[error("malformed multipart MIME: {message}")]
    MalformedMime { message: String },

    #[error("required element {element} is missing")]
    MissingElement { element: &'static str },
}
