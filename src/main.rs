//! CLI entry point for cbla_daq.
//!
//! Runs the rig headless against the simulated transport, or validates a
//! configuration file.
//!
//! # Usage
//!
//! Run for a minute and exit:
//! ```bash
//! cbla_daq run --config config/cbla.toml --duration-secs 60
//! ```
//!
//! Check a config file and print the effective settings:
//! ```bash
//! cbla_daq check-config --config config/cbla.toml
//! ```

use anyhow::{Context, Result};
use cbla_daq::config::RigConfig;
use cbla_daq::display::TracingSink;
use cbla_daq::learner::explorer_factory;
use cbla_daq::logging;
use cbla_daq::transport::SimulatedTransport;
use cbla_daq::workers::RigRuntime;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "cbla_daq")]
#[command(about = "Acquisition and control core for a CBLA sensor/actuator rig", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the simulated rig and run the control loop
    Run {
        /// Path to the rig config file
        #[arg(long)]
        config: PathBuf,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Validate a config file and print the effective settings
    CheckConfig {
        /// Path to the rig config file
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            duration_secs,
        } => run(config, duration_secs).await,
        Commands::CheckConfig { config } => check_config(config),
    }
}

fn load(path: &Path) -> Result<RigConfig> {
    let config = RigConfig::load_from(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

async fn run(path: PathBuf, duration_secs: Option<u64>) -> Result<()> {
    let config = load(&path)?;
    logging::init_from_config(&config)?;
    info!(app = %config.application.name, config = %path.display(), "Starting");

    let transport = Arc::new(SimulatedTransport::demo_rig());
    let runtime = RigRuntime::spawn(&config, transport, explorer_factory(), Arc::new(TracingSink));
    runtime.connect();

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!(secs, "Run duration elapsed"),
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted");
        }
    }

    runtime.disconnect();
    runtime.shutdown().await?;
    Ok(())
}

fn check_config(path: PathBuf) -> Result<()> {
    let config = load(&path)?;
    println!("{}", config.to_toml_string()?);
    Ok(())
}
