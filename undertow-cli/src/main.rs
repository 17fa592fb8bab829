//! Undertow CLI - Command-line interface
//!
//! Resolves locators, searches indexers, scrapes trackers and streams
//! against the simulated engine.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use undertow_core::UndertowConfig;
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "Streaming torrent engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the full-trace log of this run
    #[arg(long)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = UndertowConfig::from_env();
    let logs_dir = cli.logs_dir.unwrap_or_else(|| config.storage.logs_dir.clone());
    init_tracing(cli.log_level.as_tracing_level(), Some(&logs_dir))?;

    commands::handle_command(cli.command, config).await
}
