//! # Outbound HTTPS Transport
//!
//! POSTs wire messages to resolved backbone endpoints over mutual TLS.
//! Certificate and key material arrives as opaque PEM files provisioned
//! outside this core. The trait seam keeps the workflow engine testable
//! with a scripted transport.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::MhsConfig;

/// Raised when the client cannot be built or a request fails in flight.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to build HTTPS client: {message}")]
    Client { message: String },

    #[error("failed to read TLS material from {path}: {message}")]
    TlsMaterial { path: String, message: String },

    #[error("outbound request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// What came back from the backbone.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam the workflow engine sends through.
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &str,
    ) -> Result<TransportResponse, TransportError>;
}

/// Production transport over reqwest with rustls and client identity.
#[derive(Debug)]
pub struct HttpsTransport {
    client: reqwest::Client,
}

impl HttpsTransport {
    pub fn from_config(config: &MhsConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.outbound_timeout);

        if let Some(ca_path) = &config.ca_certs_path {
            let bundle = read_pem(ca_path)?;
            for certificate in split_pem_certificates(&bundle) {
                let certificate = reqwest::Certificate::from_pem(certificate.as_bytes())
                    .map_err(|e| TransportError::Client {
                        message: e.to_string(),
                    })?;
                builder = builder.add_root_certificate(certificate);
            }
        }

        if let (Some(cert_path), Some(key_path)) =
            (&config.client_cert_path, &config.client_key_path)
        {
            let mut identity_pem = read_pem(cert_path)?;
            identity_pem.push('\n');
            identity_pem.push_str(&read_pem(key_path)?);
            let identity = reqwest::Identity::from_pem(identity_pem.as_bytes()).map_err(|e| {
                TransportError::Client {
                    message: e.to_string(),
                }
            })?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(|e| TransportError::Client {
            message: e.to_string(),
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OutboundTransport for HttpsTransport {
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &str,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.post(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.body(body.to_string()).send().await.map_err(|e| {
            TransportError::Request {
                url: url.to_string(),
                source: e,
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = response.text().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            source: e,
        })?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn read_pem(path: &std::path::Path) -> Result<String, TransportError> {
    std::fs::read_to_string(path).map_err(|e| TransportError::TlsMaterial {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Split a PEM bundle into individual certificate blocks.
fn split_pem_certificates(bundle: &str) -> Vec<String> {
    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    bundle
        .split(BEGIN)
        .skip(1)
        .map(|block| format!("{BEGIN}{block}"))
        .map(|block| match block.find("-----END CERTIFICATE-----") {
            Some(end) => block[..end + "-----END CERTIFICATE-----".len()].to_string(),
            None => block,
        })
        .collect()
}
