//! Command-line arguments for `tickwatch`.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Watch continuously until Ctrl-C |
//! | `once` | Run a single bounded cycle |
//! | `health` | Probe the configured exchange |
//! | `version` | Print version information |

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tickwatch_core::Timeframe;

#[derive(Debug, Parser)]
#[command(
    name = "tickwatch",
    author,
    version,
    about = "Scheduled crypto market watcher with strategy alerts"
)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run evaluation cycles at the configured interval until interrupted.
    Run,
    /// Run one cycle and exit.
    Once(OnceArgs),
    /// Check that the configured exchange answers and knows the first asset.
    Health,
    /// Print version information.
    Version,
}

#[derive(Debug, Args)]
pub struct OnceArgs {
    /// Override the configured symbols (comma separated, e.g. BTC,ETH).
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Override the configured timeframes (comma separated, e.g. 1h,1d).
    #[arg(long, value_delimiter = ',')]
    pub timeframes: Vec<Timeframe>,

    /// Cycle timeout; defaults to `watcher.run_timeout_secs`.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}
