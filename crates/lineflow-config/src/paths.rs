//! Where line layouts are looked up on disk.

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Shared layout checked into a project.
const PROJECT_FILE: &str = "lineflow.toml";
/// Per-machine overrides next to [`PROJECT_FILE`], not checked in.
const LOCAL_FILE: &str = "lineflow.local.toml";

const USER_FILE: &str = "config.toml";

/// Locations of the configuration layers a run merges.
///
/// The user file holds defaults shared by every line on the machine. The
/// project and local files live in the directory a run is started from.
pub struct Paths {
    user_dir: Option<PathBuf>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            user_dir: ProjectDirs::from("dev", "lineflow", "lineflow")
                .map(|dirs| dirs.config_dir().to_path_buf()),
        }
    }

    /// `config.toml` in the platform config directory for lineflow.
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        self.user_dir
            .as_deref()
            .map(|dir| dir.join(USER_FILE))
            .ok_or_else(|| {
                ConfigError::XdgError("no home directory for user line defaults".to_string())
            })
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_FILE)
    }

    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_FILE)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
