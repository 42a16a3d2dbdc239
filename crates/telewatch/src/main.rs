mod cli;
mod commands;
mod config;
mod error;
mod output;
mod view_file;

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Logs go to stderr or --log-file; stdout stays clean for output.
    let _guard = init_tracing(cli.global.verbose, cli.global.quiet, cli.global.log_file.as_deref());

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path.file_name().map_or_else(
                || "telewatch.log".into(),
                std::ffi::OsStr::to_os_string,
            );
            let appender =
                tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Offline commands
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),
        Command::View(args) => commands::view::handle(args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "telewatch", &mut std::io::stdout());
            Ok(())
        }

        // Everything else talks to a server
        cmd => {
            let resolved = config::resolve(&cli.global)?;
            tracing::debug!(command = ?cmd, server = %resolved.engine.server, "dispatching command");
            commands::dispatch(cmd, resolved, &cli.global).await
        }
    }
}
