//! CLI command implementations.

pub mod config;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use lineflow_config::FactoryConfig;

/// Loads the layered configuration for `dir`, or the current directory.
fn load_config(dir: Option<&Path>) -> Result<FactoryConfig> {
    let config = match dir {
        Some(dir) => {
            if !dir.is_dir() {
                anyhow::bail!("Config directory {} does not exist", dir.display());
            }
            FactoryConfig::load_from_dir(dir)
        }
        None => FactoryConfig::load(),
    };
    config.context("Failed to load configuration")
}
