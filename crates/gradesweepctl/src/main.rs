//! gradesweep control - inspect and manage persisted search state
//!
//! Reads the same state directory as the daemon. Only `reset` writes.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gradesweep_common::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gradesweepctl")]
#[command(about = "Inspect gradesweep search state", long_about = None)]
#[command(version = gradesweep_common::VERSION)]
struct Cli {
    /// Config file (default /etc/gradesweep/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the state directory
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show run position and memory usage
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Show the best-known option per remembered question
    Best {
        #[arg(long)]
        json: bool,
    },

    /// Show the submission log, oldest first
    Log {
        /// Only the newest N rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Delete memory, run state and log
    Reset {
        /// Required: confirms the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref());
    if let Some(dir) = cli.state_dir {
        config.storage.state_dir = dir;
    }

    match cli.command {
        Commands::Status { json } => commands::status(&config, json),
        Commands::Best { json } => commands::best(&config, json),
        Commands::Log { limit } => commands::log(&config, limit),
        Commands::Reset { yes } => commands::reset(&config, yes),
        Commands::Config => commands::show_config(&config),
    }
}
