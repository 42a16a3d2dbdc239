//! Clap derive structures for the `telewatch` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use telewatch_core::{CardIndex, CardType, ModelId};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// telewatch -- live telemetry dashboards from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "telewatch",
    version,
    about = "Watch live telemetry from the command line",
    long_about = "Streams attribute values from a telemetry server's push channel,\n\
        restores dashboards from view tokens, and browses the device catalog.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "TELEWATCH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server base URL (overrides profile)
    #[arg(long, short = 's', env = "TELEWATCH_SERVER", global = true)]
    pub server: Option<String>,

    /// Session token (overrides profile credentials)
    #[arg(long, env = "TELEWATCH_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TELEWATCH_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "TELEWATCH_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "TELEWATCH_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream live attribute values
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Inspect and edit dashboard view tokens (offline)
    View(ViewArgs),

    /// Query the device catalog
    #[command(alias = "cat")]
    Catalog(CatalogArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Dashboard view token to restore
    #[arg(long, conflicts_with = "view_file")]
    pub view: Option<String>,

    /// File holding the view token; edits to it are picked up live
    #[arg(long, value_name = "PATH")]
    pub view_file: Option<PathBuf>,

    /// Extra attributes to subscribe (device/attribute)
    #[arg(long, short = 'm', value_name = "ID")]
    pub model: Vec<ModelId>,

    /// Catalog query run at startup so rows get labels and units
    /// (`@FILE` reads it from a file)
    #[arg(long, value_name = "QUERY")]
    pub catalog: Option<String>,

    /// Redraw a table per card instead of printing one line per change
    #[arg(long)]
    pub table: bool,

    /// Stop after this long (e.g. "30s", "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// How often the view file is checked for edits
    #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
    pub poll: Duration,
}

// ── View ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ViewArgs {
    #[command(subcommand)]
    pub command: ViewCommand,
}

#[derive(Debug, Subcommand)]
pub enum ViewCommand {
    /// Build a token from card definitions
    Encode {
        /// Card as TYPE or TYPE:ID,ID,... (repeatable, in order)
        #[arg(long = "card", short = 'c', value_name = "TYPE[:IDS]", required = true)]
        cards: Vec<CardSpec>,

        /// Card title as INDEX=TEXT (repeatable)
        #[arg(long = "title", short = 't', value_name = "INDEX=TEXT")]
        titles: Vec<TitleSpec>,
    },

    /// Show the cards a token describes
    Decode {
        /// View token (base64 or JSON)
        token: String,
    },

    /// Append a card to a token and print the new token
    AddCard {
        /// View token to extend
        token: String,

        /// LIST or TREND
        card_type: CardType,

        /// Attributes to show on the new card
        #[arg(long, short = 'm', value_name = "ID", value_delimiter = ',')]
        models: Vec<ModelId>,

        /// Card title
        #[arg(long, short = 't')]
        title: Option<String>,
    },

    /// Remove a card from a token and print the new token
    RemoveCard {
        /// View token to edit
        token: String,

        /// Index of the card to remove
        index: CardIndex,
    },
}

/// `TYPE` or `TYPE:ID,ID,...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSpec {
    pub card_type: CardType,
    pub models: Vec<ModelId>,
}

impl std::str::FromStr for CardSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, ids) = s.split_once(':').unwrap_or((s, ""));
        let card_type = kind
            .parse::<CardType>()
            .map_err(|_| format!("unknown card type '{kind}' (expected LIST or TREND)"))?;
        let models = ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ModelId::from)
            .collect();
        Ok(Self { card_type, models })
    }
}

/// `INDEX=TEXT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleSpec {
    pub index: CardIndex,
    pub title: String,
}

impl std::str::FromStr for TitleSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, title) = s
            .split_once('=')
            .ok_or_else(|| format!("expected INDEX=TEXT, got '{s}'"))?;
        Ok(Self {
            index: CardIndex::from(index.trim()),
            title: title.to_owned(),
        })
    }
}

// ── Catalog ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// Query text, `@FILE` to read it from a file, or `-` for stdin
    pub query: String,

    /// Only list this entity kind (domain, family, member, device,
    /// attribute, property)
    #[arg(long, short = 'k')]
    pub kind: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or update a profile
    Init {
        /// Server base URL
        #[arg(long)]
        server: String,

        /// Profile name
        #[arg(long = "name", default_value = "default")]
        name: String,

        /// Session token to store in the system keyring
        #[arg(long = "session-token")]
        session_token: Option<String>,

        /// Store the token in the config file instead of the keyring
        #[arg(long, requires = "session_token")]
        plaintext: bool,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
