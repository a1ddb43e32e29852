//! # Process Configuration
//!
//! Explicit configuration for the MHS core, built once at start-up and
//! passed by reference into each component constructor. Values come from
//! individually named environment variables; a parse failure is a
//! [`ConfigurationError`], never a silent fallback.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::defaults;

/// Raised when an environment value is present but unusable.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("invalid value for {variable}: {message}")]
    InvalidValue { variable: String, message: String },

    #[error("required configuration {variable} is missing")]
    Missing { variable: String },
}

/// Process-wide configuration for the MHS core.
#[derive(Debug, Clone)]
pub struct MhsConfig {
    /// Party key this MHS sends as (`eb:From` on outbound envelopes).
    pub party_key: String,

    /// Accredited system id of this MHS instance.
    pub asid: String,

    /// Org code the forward-reliable pattern routes through.
    pub spine_org_code: String,

    /// Routing cache TTL, measured from entry insertion.
    pub routing_cache_ttl: Duration,

    /// Sync-async resynchroniser polling bounds.
    pub resync_initial_delay: Duration,
    pub resync_max_retries: u32,
    pub resync_retry_interval: Duration,

    /// Persistence adaptor retry bounds, applied uniformly to every store
    /// operation.
    pub store_max_retries: u32,
    pub store_retry_delay: Duration,

    /// Directory (SDS) connection settings.
    pub directory_url: String,
    pub directory_pool_size: usize,

    /// Outbound HTTPS settings. Certificate material is supplied as opaque
    /// PEM files provisioned outside this core.
    pub outbound_timeout: Duration,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub ca_certs_path: Option<PathBuf>,
}

impl Default for MhsConfig {
    fn default() -> Self {
        Self {
            party_key: String::new(),
            asid: String::new(),
            spine_org_code: "YES".to_string(),
            routing_cache_ttl: Duration::from_secs(defaults::ROUTING_CACHE_TTL_SECS),
            resync_initial_delay: Duration::from_millis(defaults::RESYNC_INITIAL_DELAY_MS),
            resync_max_retries: defaults::RESYNC_MAX_RETRIES,
            resync_retry_interval: Duration::from_millis(defaults::RESYNC_RETRY_INTERVAL_MS),
            store_max_retries: defaults::STORE_MAX_RETRIES,
            store_retry_delay: Duration::from_millis(defaults::STORE_RETRY_DELAY_MS),
            directory_url: "ldap://localhost:389".to_string(),
            directory_pool_size: defaults::DIRECTORY_POOL_SIZE,
            outbound_timeout: Duration::from_secs(defaults::OUTBOUND_TIMEOUT_SECS),
            client_cert_path: None,
            client_key_path: None,
            ca_certs_path: None,
        }
    }
}

impl MhsConfig {
    /// Build configuration from the process environment.
    ///
    /// `MHS_PARTY_KEY`, `MHS_ASID` and `MHS_DIRECTORY_URL` are required;
    /// everything else falls back to the defaults in
    /// [`crate::constants::defaults`].
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let mut config = Self {
            party_key: require_env("MHS_PARTY_KEY")?,
            asid: require_env("MHS_ASID")?,
            directory_url: require_env("MHS_DIRECTORY_URL")?,
            ..Self::default()
        };

        if let Ok(org_code) = std::env::var("MHS_SPINE_ORG_CODE") {
            config.spine_org_code = org_code;
        }
        if let Some(ttl) = parse_env("MHS_ROUTING_CACHE_TTL_SECS")? {
            config.routing_cache_ttl = Duration::from_secs(ttl);
        }
        if let Some(delay) = parse_env("MHS_RESYNC_INITIAL_DELAY_MS")? {
            config.resync_initial_delay = Duration::from_millis(delay);
        }
        if let Some(retries) = parse_env("MHS_RESYNC_MAX_RETRIES")? {
            config.resync_max_retries = retries;
        }
        if let Some(interval) = parse_env("MHS_RESYNC_RETRY_INTERVAL_MS")? {
            config.resync_retry_interval = Duration::from_millis(interval);
        }
        if let Some(retries) = parse_env("MHS_STORE_MAX_RETRIES")? {
            config.store_max_retries = retries;
        }
        if let Some(delay) = parse_env("MHS_STORE_RETRY_DELAY_MS")? {
            config.store_retry_delay = Duration::from_millis(delay);
        }
        if let Some(size) = parse_env("MHS_DIRECTORY_POOL_SIZE")? {
            config.directory_pool_size = size;
        }
        if let Some(timeout) = parse_env("MHS_OUTBOUND_TIMEOUT_SECS")? {
            config.outbound_timeout = Duration::from_secs(timeout);
        }
        config.client_cert_path = std::env::var("MHS_CLIENT_CERT_PATH").ok().map(PathBuf::from);
        config.client_key_path = std::env::var("MHS_CLIENT_KEY_PATH").ok().map(PathBuf::from);
        config.ca_certs_path = std::env::var("MHS_CA_CERTS_PATH").ok().map(PathBuf::from);

        Ok(config)
    }
}

fn require_env(variable: &str) -> Result<String, ConfigurationError> {
    std::env::var(variable).map_err(|_| ConfigurationError::Missing {
        variable: variable.to_string(),
    })
}

fn parse_env<T: std::str::FromStr>(variable: &str) -> Result<Option<T>, ConfigurationError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(variable) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigurationError::InvalidValue {
                variable: variable.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
