//! Command dispatch: bridges CLI args to the engine and output formatting.

pub mod catalog;
pub mod config_cmd;
pub mod view;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a server-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, resolved, global).await,
        Command::Catalog(args) => catalog::handle(args, &resolved, global).await,
        // Offline commands are handled before dispatch
        Command::Config(_) | Command::View(_) | Command::Completions(_) => unreachable!(),
    }
}
