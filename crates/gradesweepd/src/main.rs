//! gradesweep daemon
//!
//! Loads config and persisted state, takes the state-directory lock and
//! runs rounds until full score.

use anyhow::{bail, Context, Result};
use clap::Parser;
use gradesweep_common::{Config, Engine, StrategyKind};
use gradesweepd::command_surface::CommandSurface;
use gradesweepd::lock::InstanceLock;
use gradesweepd::simulated::{parse_secret, SimulatedSurface};
use gradesweepd::{notifier, prior, AssessmentSurface, Driver, Outcome};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gradesweepd")]
#[command(about = "Answer-vector search daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default /etc/gradesweep/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the state directory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Override the search strategy (rotation, ascent)
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Stop after this many rounds
    #[arg(long)]
    max_rounds: Option<u64>,

    /// Grade against a simulated answer key instead of the helper, e.g. "2,1,4"
    #[arg(long, value_name = "KEY")]
    simulate: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("gradesweepd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(cli.config.as_deref());
    if let Some(dir) = cli.state_dir {
        config.storage.state_dir = dir;
    }
    if let Some(strategy) = cli.strategy {
        config.search.strategy = strategy;
    }
    if cli.max_rounds.is_some() {
        config.search.max_rounds = cli.max_rounds;
    }

    let engine = Engine::open(&config);
    let _lock = InstanceLock::acquire(&engine.paths().lock())
        .context("Another gradesweepd owns this state directory")?;

    match cli.simulate {
        Some(key) => {
            let secret = parse_secret(&key).map_err(anyhow::Error::msg)?;
            let surface = SimulatedSurface::new(secret, config.search.options_per_question);
            drive(&config, engine, surface).await
        }
        None => {
            let Some(surface) = CommandSurface::from_config(&config.surface) else {
                bail!("No surface.command configured; set one or use --simulate");
            };
            drive(&config, engine, surface).await
        }
    }
}

async fn drive<S: AssessmentSurface>(config: &Config, engine: Engine, surface: S) -> Result<()> {
    let notifier = notifier::from_config(&config.notify);
    let mut driver =
        Driver::new(config, engine, surface, notifier).with_prior(prior::from_config(&config.prior));

    tokio::select! {
        outcome = driver.run() => {
            match outcome? {
                Outcome::Solved { round, answers } => {
                    info!("Solved at round {}: {:?}", round, answers);
                }
                Outcome::RoundLimit { rounds } => {
                    info!("Round limit reached after {} rounds", rounds);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down gracefully");
        }
    }
    Ok(())
}
