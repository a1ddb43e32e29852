//! # Structured Logging Module
//!
//! Environment-aware structured logging for tracing message workflows
//! across the codec, routing, transport and persistence layers.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// In production the output is JSON for log shipping, elsewhere it is
/// human-readable console output.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let result = if environment == "production" {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(EnvFilter::new(log_level)),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_ansi(true)
                        .with_filter(EnvFilter::new(log_level)),
                )
                .try_init()
        };

        // A global subscriber may already be set by an embedding process.
        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables.
fn get_environment() -> String {
    std::env::var("MHS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment.
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log a work description state transition with full context.
pub fn log_state_transition(
    message_id: &str,
    workflow: &str,
    from_status: Option<&str>,
    to_status: &str,
) {
    tracing::info!(
        message_id = %message_id,
        workflow = %workflow,
        from_status = from_status,
        to_status = %to_status,
        "📋 STATE_TRANSITION"
    );
}

/// Log an outbound send attempt.
pub fn log_send_attempt(message_id: &str, url: &str, attempt: u32, max_attempts: u32) {
    tracing::info!(
        message_id = %message_id,
        url = %url,
        attempt = attempt,
        max_attempts = max_attempts,
        "📤 OUTBOUND_SEND"
    );
}
