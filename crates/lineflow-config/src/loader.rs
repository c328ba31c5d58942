//! Configuration loader with multi-source merging

use crate::{FactoryConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "LINEFLOW".to_string(),
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "LINEFLOW")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/lineflow/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<FactoryConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = FactoryConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/lineflow/config.toml)
        if self.include_user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                if user_config_file.exists() {
                    builder = builder.add_source(
                        config::File::from(user_config_file)
                            .required(false)
                            .format(config::FileFormat::Toml),
                    );
                }
            }
        }

        // 3. Project config (lineflow.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local config (lineflow.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (LINEFLOW_RUN__SEED=7)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let factory_config: FactoryConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        factory_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(factory_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stage;
    use std::fs;
    use tempfile::tempdir;

    fn loader_for(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("LINEFLOW_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader_for(temp_dir.path())
            .load()
            .expect("Failed to load config");

        assert_eq!(config, FactoryConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
route = [[1], [2, 3]]

[run]
seed = 99
horizon = 250.0
max_items = 40

[stock]
devices = 1

[[stations]]
fail_probability = 0.5

[[stations]]
fail_probability = 0.0
work_time_mean = 2.5

[[stations]]
repair_time_mean = 9.0
"#;
        fs::write(project_dir.join("lineflow.toml"), config_content)
            .expect("Failed to write config");

        let config = loader_for(project_dir).load().expect("Failed to load config");

        assert_eq!(config.run.seed, 99);
        assert_eq!(config.run.horizon, 250.0);
        assert_eq!(config.run.max_items, Some(40));
        assert_eq!(config.stock.devices, 1);
        assert_eq!(config.stations.len(), 3);
        assert_eq!(config.stations[0].fail_probability, 0.5);
        assert_eq!(config.stations[1].work_time_mean, 2.5);
        assert_eq!(config.stations[2].repair_time_mean, 9.0);
        assert_eq!(config.route, vec![Stage::Station(1), Stage::Either(2, 3)]);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(project_dir.join("lineflow.toml"), "[run]\nseed = 1\n")
            .expect("Failed to write project config");
        fs::write(project_dir.join("lineflow.local.toml"), "[run]\nseed = 2\n")
            .expect("Failed to write local config");

        let config = loader_for(project_dir).load().expect("Failed to load config");

        // Local config should override project config
        assert_eq!(config.run.seed, 2);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("lineflow.toml"),
            "[processing]\nfaulty_probability = 2.0\n",
        )
        .expect("Failed to write project config");

        let err = loader_for(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("faulty_probability"));
    }

    // Environment overrides use `__` between sections, e.g.
    //
    // LINEFLOW_RUN__SEED=7
    // LINEFLOW_STOCK__DEVICES=2
    //
    // They are not exercised here because the process environment is shared
    // between concurrently running tests.
}
