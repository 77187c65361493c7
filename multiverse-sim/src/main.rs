// src/main.rs

//! Simulator binary entry point.

use multiverse_sim::{SimConfig, Simulation};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Multiverse consensus simulator");
    tracing::info!("Version: {}", multiverse_sim::SIM_VERSION);

    // An optional first argument names the configuration file
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            tracing::info!("loading configuration from {}", path.display());
            SimConfig::from_file(&path)?
        }
        None => SimConfig::default(),
    };

    let simulation = Simulation::new(config)?;
    simulation.run().await;

    Ok(())
}
