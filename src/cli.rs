//! Command-line interface definitions: `kalshid run` boots the trading
//! backend in the foreground; `kalshid status` reports whether it looks
//! alive. Trimmed from the teacher's `cli::Commands` — no systemd
//! install/uninstall/logs subcommands, since this backend isn't shipped as
//! a systemd unit.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// An automated trading backend for the Kalshi prediction market exchange.
#[derive(Parser, Debug)]
#[command(name = "kalshid")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the trading backend (foreground)
    Run(RunArgs),

    /// Report whether a `kalshid run` process appears to be alive
    Status,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Use JSON log format instead of pretty
    #[arg(long)]
    pub json_logs: bool,

    /// Override the active environment (live, demo)
    #[arg(long)]
    pub environment: Option<String>,

    /// Refuse to start with global trading enabled, regardless of config
    #[arg(long)]
    pub dry_run: bool,
}
