mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use commands::{App, Command};
use config::Settings;

/// logdeck - browse, filter, follow and export backend session logs
#[derive(Parser, Debug)]
#[command(name = "logdeck")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to <config dir>/logdeck/config.toml if present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding session log files
    #[arg(long, value_name = "DIR")]
    session_dir: Option<PathBuf>,

    /// Maximum number of entries kept in memory
    #[arg(long)]
    max_logs: Option<usize>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(dir) = args.session_dir {
        settings.session_dir = Some(dir);
    }
    if let Some(max_logs) = args.max_logs {
        settings.max_logs = max_logs;
    }

    let app = App::new(settings);
    commands::run(args.command, &app).await
}
