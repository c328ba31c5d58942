//! lineflow command-line runner.
//!
//! # Quick Start
//!
//! ```bash
//! # One run of the reference line with seed 7, as pretty JSON
//! lineflow run --seed 7 --pretty
//!
//! # Show the configuration a run in this directory would use
//! lineflow config
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// lineflow - deterministic production line simulation.
#[derive(Parser)]
#[command(name = "lineflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulation and print its report as JSON.
    Run {
        /// Seed for the random number generator.
        #[arg(short, long)]
        seed: Option<u64>,

        /// Virtual time to simulate, in model time units.
        #[arg(long)]
        horizon: Option<f64>,

        /// Directory holding lineflow.toml (defaults to the current directory).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop admitting items after this many.
        #[arg(long)]
        max_items: Option<u64>,

        /// Include the route of every finished item in the report.
        #[arg(long)]
        traces: bool,

        /// Pretty-print the JSON report.
        #[arg(long)]
        pretty: bool,
    },

    /// Print the effective configuration.
    Config {
        /// Directory holding lineflow.toml (defaults to the current directory).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            seed,
            horizon,
            config,
            max_items,
            traces,
            pretty,
        } => commands::run::run(&commands::run::RunArgs {
            seed,
            horizon,
            config_dir: config,
            max_items,
            traces,
            pretty,
        }),
        Commands::Config { config, format } => commands::config::show(config.as_deref(), &format),
    }
}
