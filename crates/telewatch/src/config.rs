//! CLI configuration: thin wrapper around `telewatch_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--server, --token, --insecure, --timeout).

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use telewatch_core::{EngineConfig, SessionToken, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use telewatch_config::{Config, Profile, config_path, load_config_or_default, save_config};

/// Engine config plus the profile's view file, if any.
pub struct Resolved {
    pub engine: EngineConfig,
    pub view_file: Option<PathBuf>,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.profile_name(global.profile.as_deref()).to_owned()
}

/// Build an `EngineConfig` from the config file, profile, and flags.
///
/// Flags win over profile values. Without a matching profile, `--server`
/// alone is enough.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let (mut engine, view_file) = match cfg.profiles.get(&profile_name) {
        Some(profile) => (
            telewatch_config::profile_to_engine_config(profile, &profile_name)?,
            profile.view_file.clone(),
        ),
        None => {
            if global.profile.is_some() {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: available_profiles(&cfg),
                });
            }
            let server = global.server.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            let mut engine = EngineConfig::new(parse_server(server)?);
            engine.timeout = Duration::from_secs(cfg.defaults.timeout);
            if cfg.defaults.insecure {
                engine.tls = TlsVerification::DangerAcceptInvalid;
            }
            (engine, None)
        }
    };

    apply_overrides(&mut engine, global)?;
    Ok(Resolved { engine, view_file })
}

fn apply_overrides(engine: &mut EngineConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref server) = global.server {
        engine.server = parse_server(server)?;
    }
    if let Some(ref token) = global.token {
        let token = SecretString::from(token.clone());
        engine.session = Some(match engine.session.take() {
            Some(existing) => SessionToken {
                token,
                ..existing
            },
            None => SessionToken::new(token),
        });
    }
    if global.insecure {
        engine.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        engine.timeout = Duration::from_secs(timeout);
    }
    Ok(())
}

fn parse_server(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "server".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
