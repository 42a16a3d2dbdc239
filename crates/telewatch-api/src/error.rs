use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `telewatch-api` crate.
///
/// Covers every failure mode of the two server surfaces: the catalog
/// query endpoint (HTTP) and the push channel (WebSocket).
/// `telewatch-core` maps these into its own error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A catalog request ran past its timeout.
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Catalog ─────────────────────────────────────────────────────
    /// The catalog endpoint answered with an `errors` list.
    #[error("Catalog query failed: {}", messages.join("; "))]
    Catalog { messages: Vec<String> },

    // ── Push channel ────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The server closed the socket with a code other than normal closure.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// An outbound frame was offered while the channel was not open.
    #[error("Push channel is not open")]
    ChannelUnavailable,

    /// An inbound frame could not be parsed into events.
    #[error("Malformed push frame: {reason}")]
    MalformedFrame { reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// JSON serialization of an outbound payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_error_joins_messages() {
        let err = Error::Catalog {
            messages: vec!["bad pattern".into(), "unknown field".into()],
        };
        assert_eq!(
            err.to_string(),
            "Catalog query failed: bad pattern; unknown field"
        );
    }

    #[test]
    fn timeout_names_the_configured_duration() {
        let err = Error::Timeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Request timed out after 250ms");
    }
}
