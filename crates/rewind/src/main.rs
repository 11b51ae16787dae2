//! Rewind - Stepped Execution Visualizer
//!
//! Replays recorded program executions one line at a time and reconstructs
//! their call trees.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;

mod cmd;

/// Command-line interface for Rewind
#[derive(Debug, Parser)]
#[command(name = "rewind")]
#[command(about = "Rewind - step through recorded executions and inspect their call trees")]
#[command(version)]
pub struct Cli {
    /// Engine configuration file (default: ~/.rewind.toml when present)
    #[arg(long, global = true, env = "REWIND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play a recorded trace to completion and print its call tree
    Replay {
        /// Path to the trace file
        trace: PathBuf,

        /// Delay between steps in milliseconds
        #[arg(long)]
        speed: Option<u64>,

        /// Halve the delay between steps
        #[arg(long)]
        turbo: bool,

        /// Maximum number of snapshots kept in history
        #[arg(long)]
        max_history: Option<usize>,

        /// Do not print every step
        #[arg(long, short)]
        quiet: bool,

        /// Print the call tree and metrics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a trace file and summarize it
    Inspect {
        /// Path to the trace file
        trace: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    rewind_common::logging::init_simple_logging(tracing::Level::WARN)?;

    match &cli.command {
        Commands::Replay { trace, speed, turbo, max_history, quiet, json } => {
            tracing::info!("Replaying trace: {}", trace.display());
            let options = cmd::ReplayOptions {
                speed: *speed,
                turbo: *turbo,
                max_history: *max_history,
                quiet: *quiet,
                json: *json,
            };
            cmd::replay_trace(trace, cli.config.as_deref(), &options).await
        }
        Commands::Inspect { trace } => {
            tracing::info!("Inspecting trace: {}", trace.display());
            cmd::inspect_trace(trace)
        }
    }
}
