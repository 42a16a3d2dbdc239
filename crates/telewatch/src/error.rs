//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use telewatch_config::ConfigError;
use telewatch_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to server at {url}")]
    #[diagnostic(
        code(telewatch::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             URL: {url}\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out after {}", humantime::format_duration(*.timeout))]
    #[diagnostic(
        code(telewatch::timeout),
        help("Increase timeout with --timeout or check server responsiveness.")
    )]
    Timeout { timeout: Duration },

    // ── Server responses ─────────────────────────────────────────────
    #[error("Catalog query failed: {message}")]
    #[diagnostic(
        code(telewatch::catalog),
        help("Check the query text; the server rejected it.")
    )]
    Catalog { message: String },

    #[error("API error ({status}): {message}")]
    #[diagnostic(code(telewatch::api_error))]
    Api { status: String, message: String },

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(telewatch::not_found),
        help("Run: telewatch catalog to see what the server knows about.")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    // ── View tokens ──────────────────────────────────────────────────
    #[error("Invalid view token: {reason}")]
    #[diagnostic(
        code(telewatch::invalid_token),
        help("Tokens are URL-safe base64 of the view JSON; the JSON itself is accepted too.")
    )]
    InvalidToken { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(telewatch::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(telewatch::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: telewatch config init --server URL --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(telewatch::no_config),
        help(
            "Pass --server URL, or create a profile with: telewatch config init --server URL\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(telewatch::config))]
    Config(#[from] ConfigError),

    // ── Engine ───────────────────────────────────────────────────────
    #[error("Engine error: {message}")]
    #[diagnostic(code(telewatch::engine))]
    Engine { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot render output: {message}")]
    #[diagnostic(code(telewatch::output))]
    Output { message: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::InvalidToken { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedToken { reason } => CliError::InvalidToken { reason },

            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::ChannelUnavailable => CliError::ConnectionFailed {
                url: "(push channel)".into(),
                reason: "push channel is not open".into(),
            },

            CoreError::Timeout { timeout } => CliError::Timeout { timeout },

            CoreError::UnknownEntityReference { kind, id } => CliError::NotFound {
                resource_type: kind,
                identifier: id,
            },

            CoreError::Catalog { message } => CliError::Catalog { message },

            CoreError::Api { message, status } => CliError::Api {
                status: status.map_or_else(|| "-".into(), |s| s.to_string()),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            err @ (CoreError::MalformedFrame { .. }
            | CoreError::EngineStopped
            | CoreError::Internal(_)) => CliError::Engine {
                message: err.to_string(),
            },
        }
    }
}

impl From<telewatch_api::Error> for CliError {
    fn from(err: telewatch_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
