//! Configuration inspection.

use std::path::Path;

use anyhow::Result;

/// Prints the configuration a run would use.
pub fn show(dir: Option<&Path>, format: &str) -> Result<()> {
    let config = super::load_config(dir)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => print!("{}", toml::to_string_pretty(&config)?),
        other => anyhow::bail!("Unknown format '{other}' (expected toml or json)"),
    }
    Ok(())
}
