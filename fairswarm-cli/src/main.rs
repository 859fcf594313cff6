//! Fairswarm CLI - Command-line interface
//!
//! Runs swarm simulations and prints their round tables and summaries.

mod commands;
mod report;

use std::path::PathBuf;

use clap::Parser;
use fairswarm_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "fairswarm")]
#[command(about = "Round-based simulator of fair piece exchange swarms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Directory for the full trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command)
}
