// ── Runtime engine configuration ──
//
// These types describe *how* to reach a telemetry server and how the
// engine paces its side effects. They carry credential data and tuning,
// but never touch disk. The CLI constructs an `EngineConfig` and hands it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::CoreError;

/// Default push-channel path relative to the server URL.
pub const DEFAULT_SOCKET_PATH: &str = "/socket";

/// Default catalog query path relative to the server URL.
pub const DEFAULT_CATALOG_PATH: &str = "/db";

/// Default cookie carrying the session token.
pub const DEFAULT_COOKIE_NAME: &str = "session_jwt";

/// Trailing debounce window for view-token writes.
pub const DEFAULT_PERSIST_DEBOUNCE: Duration = Duration::from_millis(100);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Session token presented to the server as a cookie.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub cookie_name: String,
    pub token: SecretString,
}

impl SessionToken {
    pub fn new(token: SecretString) -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            token,
        }
    }

    /// `name=value`, ready for a `Cookie` header.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.cookie_name, self.token.expose_secret())
    }
}

/// Push-channel reconnection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Configuration for one engine instance.
///
/// Built by the CLI, passed to [`Engine`](crate::Engine). Core never reads
/// config files.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Server base URL (e.g. `http://localhost:5004`).
    pub server: Url,
    /// Push-channel path, joined onto `server` with a `ws`/`wss` scheme.
    pub socket_path: String,
    /// Catalog query path, joined onto `server`.
    pub catalog_path: String,
    /// Optional session token; anonymous (read-only) access without it.
    pub session: Option<SessionToken>,
    pub tls: TlsVerification,
    /// Catalog request timeout.
    pub timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Trailing debounce window for persisted view writes.
    pub persist_debounce: Duration,
}

impl EngineConfig {
    /// Config for `server` with every other field at its default.
    pub fn new(server: Url) -> Self {
        Self {
            server,
            socket_path: DEFAULT_SOCKET_PATH.into(),
            catalog_path: DEFAULT_CATALOG_PATH.into(),
            session: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            persist_debounce: DEFAULT_PERSIST_DEBOUNCE,
        }
    }

    /// The push-channel URL: `server` + `socket_path`, `http` → `ws`,
    /// `https` → `wss`.
    pub fn socket_url(&self) -> Result<Url, CoreError> {
        let mut url = self.join(&self.socket_path)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(CoreError::Config {
                    message: format!("unsupported server scheme `{other}`"),
                });
            }
        };
        url.set_scheme(scheme).map_err(|()| CoreError::Config {
            message: format!("cannot derive push-channel URL from {}", self.server),
        })?;
        Ok(url)
    }

    /// The catalog query endpoint.
    pub fn catalog_url(&self) -> Result<Url, CoreError> {
        self.join(&self.catalog_path)
    }

    fn join(&self, path: &str) -> Result<Url, CoreError> {
        self.server.join(path).map_err(|e| CoreError::Config {
            message: format!("invalid path `{path}`: {e}"),
        })
    }
}
