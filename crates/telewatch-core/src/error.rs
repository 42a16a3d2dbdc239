// ── Core error types ──
//
// User-facing errors from telewatch-core. None of these are fatal: the
// engine recovers locally (skip, placeholder, resubscribe) and reports the
// rest as notifications. The `From<telewatch_api::Error>` impl translates
// transport-layer errors into domain-appropriate variants.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Engine-level recoverable errors ──────────────────────────────
    #[error("Malformed view token: {reason}")]
    MalformedToken { reason: String },

    #[error("Malformed push frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Unknown {kind}: {id}")]
    UnknownEntityReference { kind: String, id: String },

    #[error("Push channel is not open")]
    ChannelUnavailable,

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Server request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    // ── Catalog errors ───────────────────────────────────────────────
    #[error("Catalog query failed: {message}")]
    Catalog { message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Engine is not running")]
    EngineStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<telewatch_api::Error> for CoreError {
    fn from(err: telewatch_api::Error) -> Self {
        match err {
            telewatch_api::Error::Transport(ref e) => {
                if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            telewatch_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            telewatch_api::Error::Timeout { timeout } => CoreError::Timeout { timeout },
            telewatch_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            telewatch_api::Error::Catalog { messages } => CoreError::Catalog {
                message: messages.join("; "),
            },
            telewatch_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            err @ telewatch_api::Error::WebSocketClosed { .. } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: err.to_string(),
            },
            telewatch_api::Error::ChannelUnavailable => CoreError::ChannelUnavailable,
            telewatch_api::Error::MalformedFrame { reason } => CoreError::MalformedFrame { reason },
            telewatch_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            telewatch_api::Error::Serialization(e) => {
                CoreError::Internal(format!("Serialization error: {e}"))
            }
        }
    }
}
