//! Config subcommand handlers.

use std::fmt::Write;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// A copy of `cfg` with plaintext tokens masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(MASK.into());
        }
    }
    cfg
}

/// TOML-shaped dump, secrets masked.
fn format_config(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "server = \"{}\"", p.server);
        let strings = [
            ("socket_path", p.socket_path.as_deref()),
            ("catalog_path", p.catalog_path.as_deref()),
            ("token", p.token.as_ref().map(|_| MASK)),
            ("token_env", p.token_env.as_deref()),
            ("cookie_name", p.cookie_name.as_deref()),
            ("reconnect_max_delay", p.reconnect_max_delay.as_deref()),
            ("persist_debounce", p.persist_debounce.as_deref()),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = \"{value}\"");
            }
        }
        if let Some(ref path) = p.view_file {
            let _ = writeln!(out, "view_file = \"{}\"", path.display());
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(retries) = p.reconnect_max_retries {
            let _ = writeln!(out, "reconnect_max_retries = {retries}");
        }
    }

    out
}

/// Insert or update `name`; returns whether it became the default.
fn upsert_profile(
    cfg: &mut Config,
    name: &str,
    server: String,
    token: Option<String>,
    make_default: bool,
) -> bool {
    let first = cfg.profiles.is_empty();
    let profile = cfg.profiles.entry(name.to_owned()).or_insert_with(Profile::default);
    profile.server = server;
    if token.is_some() {
        profile.token = token;
    }
    if make_default || first {
        cfg.default_profile = Some(name.to_owned());
        true
    } else {
        false
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            server,
            name,
            session_token,
            plaintext,
            default,
        } => {
            let parsed: url::Url = server.parse().map_err(|_| CliError::Validation {
                field: "server".into(),
                reason: format!("invalid URL: {server}"),
            })?;

            let plaintext_token = match session_token {
                Some(token) if plaintext => Some(token),
                Some(token) => {
                    telewatch_config::store_token(&name, &token)?;
                    eprintln!("✓ Session token stored in system keyring");
                    None
                }
                None => None,
            };

            let mut cfg = config::load_config_or_default();
            let is_default =
                upsert_profile(&mut cfg, &name, parsed.to_string(), plaintext_token, default);
            let path = config::save_config(&cfg)?;

            eprintln!("✓ Profile '{name}' written to {}", path.display());
            if is_default {
                eprintln!("  Default profile: {name}");
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = output::render_single(global.output, &cfg, format_config)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
    }
}
