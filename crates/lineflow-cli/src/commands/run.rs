//! Single simulation run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use lineflow_sim::Simulation;

/// Options of `lineflow run` that override the loaded configuration.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub seed: Option<u64>,
    pub horizon: Option<f64>,
    pub config_dir: Option<PathBuf>,
    pub max_items: Option<u64>,
    pub traces: bool,
    pub pretty: bool,
}

/// Runs one simulation, checks its invariants and prints the report.
pub fn run(args: &RunArgs) -> Result<()> {
    let mut config = super::load_config(args.config_dir.as_deref())?;

    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(horizon) = args.horizon {
        config = config.with_horizon(horizon);
    }
    if let Some(max_items) = args.max_items {
        config = config.with_max_items(max_items);
    }
    if args.traces {
        config = config.with_item_traces();
    }
    config.validate().context("Invalid command-line override")?;

    tracing::info!(
        seed = config.run.seed,
        horizon = config.run.horizon,
        stations = config.stations.len(),
        "starting simulation"
    );

    let mut sim = Simulation::new(config).context("Failed to build simulation")?;
    let summary = sim.run().context("Simulation failed")?;
    tracing::info!(stop = ?summary.stop, events = summary.events_processed, "run finished");

    println!("{}", sim.report().to_json(args.pretty)?);
    Ok(())
}
