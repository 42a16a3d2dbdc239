//! Shared configuration for telewatch tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `telewatch_core::EngineConfig`. The CLI adds
//! flag-aware overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use telewatch_core::config::{DEFAULT_CATALOG_PATH, DEFAULT_COOKIE_NAME, DEFAULT_SOCKET_PATH};
use telewatch_core::{EngineConfig, SessionToken, TlsVerification};

const KEYRING_SERVICE: &str = "telewatch";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles, in file order.
    #[serde(default)]
    pub profiles: IndexMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: IndexMap::new(),
        }
    }
}

impl Config {
    /// The profile to use: `requested`, else `default_profile`, else
    /// `"default"`.
    pub fn profile_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named server profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "https://telemetry.example.org").
    pub server: String,

    /// Push-channel path, default "/socket".
    pub socket_path: Option<String>,

    /// Catalog query path, default "/db".
    pub catalog_path: Option<String>,

    /// Session token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name holding the session token.
    pub token_env: Option<String>,

    /// Cookie the token travels in, default "session_jwt".
    pub cookie_name: Option<String>,

    /// File holding the persisted dashboard token.
    pub view_file: Option<PathBuf>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Longest reconnect backoff, e.g. "30s".
    pub reconnect_max_delay: Option<String>,

    /// Reconnect attempts before giving up; unset retries forever.
    pub reconnect_max_retries: Option<u32>,

    /// View-token write debounce, e.g. "100ms".
    pub persist_debounce: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "telewatch", "telewatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("telewatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing is fine), then `TELEWATCH_*` variables.
/// Nested keys use `__`, e.g. `TELEWATCH_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TELEWATCH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the session token: `token_env` → keyring → plaintext.
///
/// `None` means the server is used without a session.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

/// Store a session token in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(token)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/token")
}

fn parse_duration(field: &str, raw: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    raw.map(|raw| {
        humantime::parse_duration(raw).map_err(|e| ConfigError::Validation {
            field: field.into(),
            reason: format!("'{raw}': {e}"),
        })
    })
    .transpose()
}

/// Build an `EngineConfig` from a profile, no CLI flag overrides.
pub fn profile_to_engine_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<EngineConfig, ConfigError> {
    let server: url::Url = profile
        .server
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "server".into(),
            reason: format!("invalid URL: {}", profile.server),
        })?;

    let mut config = EngineConfig::new(server);
    config.socket_path = profile
        .socket_path
        .clone()
        .unwrap_or_else(|| DEFAULT_SOCKET_PATH.into());
    config.catalog_path = profile
        .catalog_path
        .clone()
        .unwrap_or_else(|| DEFAULT_CATALOG_PATH.into());

    config.session = resolve_token(profile, profile_name).map(|token| SessionToken {
        cookie_name: profile
            .cookie_name
            .clone()
            .unwrap_or_else(|| DEFAULT_COOKIE_NAME.into()),
        token,
    });

    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or_else(default_timeout));

    if let Some(max_delay) =
        parse_duration("reconnect_max_delay", profile.reconnect_max_delay.as_deref())?
    {
        config.reconnect.max_delay = max_delay;
    }
    config.reconnect.max_retries = profile.reconnect_max_retries;
    if let Some(debounce) =
        parse_duration("persist_debounce", profile.persist_debounce.as_deref())?
    {
        config.persist_debounce = debounce;
    }

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "lab"

[defaults]
output = "json"
timeout = 10

[profiles.lab]
server = "https://lab.example.org:10001"
token_env = "PATH"
reconnect_max_delay = "5s"
persist_debounce = "250ms"

[profiles.prod]
server = "https://prod.example.org"
socket_path = "/ws"
insecure = true
"#;

    fn sample() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        load_config_from(&path).unwrap()
    }

    #[test]
    fn loads_profiles_in_file_order() {
        let config = sample();
        assert_eq!(config.profile_name(None), "lab");
        assert_eq!(config.profile_name(Some("prod")), "prod");
        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.color, "auto");
        assert_eq!(
            config.profiles.keys().collect::<Vec<_>>(),
            vec!["lab", "prod"]
        );
        assert!(matches!(
            config.profile("staging"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn profile_maps_onto_engine_config() {
        let config = sample();
        let engine = profile_to_engine_config(config.profile("lab").unwrap(), "lab").unwrap();

        assert_eq!(engine.socket_url().unwrap().as_str(), "wss://lab.example.org:10001/socket");
        assert_eq!(engine.reconnect.max_delay, Duration::from_secs(5));
        assert_eq!(engine.persist_debounce, Duration::from_millis(250));
        assert_eq!(engine.tls, TlsVerification::SystemDefaults);
        assert_eq!(engine.timeout, Duration::from_secs(30));

        // `token_env` names a variable that is always set.
        let session = engine.session.unwrap();
        assert_eq!(session.cookie_name, "session_jwt");
        assert_eq!(
            session.token.expose_secret(),
            std::env::var("PATH").unwrap().as_str()
        );
    }

    #[test]
    fn insecure_and_paths_override() {
        let profile = Profile {
            server: "https://prod.example.org".into(),
            socket_path: Some("/ws".into()),
            token_env: Some("PATH".into()),
            insecure: Some(true),
            ..Profile::default()
        };
        let engine = profile_to_engine_config(&profile, "prod").unwrap();
        assert_eq!(engine.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(engine.socket_url().unwrap().as_str(), "wss://prod.example.org/ws");
        assert_eq!(engine.catalog_url().unwrap().as_str(), "https://prod.example.org/db");
    }

    #[test]
    fn rejects_bad_values() {
        let profile = Profile {
            server: "not a url".into(),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_engine_config(&profile, "x"),
            Err(ConfigError::Validation { .. })
        ));

        let profile = Profile {
            server: "http://localhost".into(),
            token_env: Some("PATH".into()),
            persist_debounce: Some("soon".into()),
            ..Profile::default()
        };
        let err = profile_to_engine_config(&profile, "x").unwrap_err();
        assert!(err.to_string().contains("persist_debounce"));
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = sample();
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }
}
