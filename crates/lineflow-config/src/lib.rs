//! Configuration management for lineflow
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (LINEFLOW_* prefix, `__` between sections)
//! 3. lineflow.local.toml (gitignored, local overrides)
//! 4. lineflow.toml (git-tracked, project config)
//! 5. ~/.config/lineflow/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)
//!
//! The built-in defaults describe the reference six-station line: stations
//! 1-3 in series, stations 4 and 5 as an alternate-path pair, station 6 last.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Failure probabilities of the reference line, station 1 first.
pub const DEFAULT_FAIL_PROBABILITIES: [f64; 6] = [0.02, 0.01, 0.05, 0.15, 0.07, 0.06];

/// Main lineflow configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FactoryConfig {
    /// Stages every item goes through, in order.
    pub route: Vec<Stage>,
    pub run: RunConfig,
    pub arrivals: ArrivalConfig,
    pub processing: ProcessingConfig,
    pub stock: StockConfig,
    pub stations: Vec<StationConfig>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            arrivals: ArrivalConfig::default(),
            processing: ProcessingConfig::default(),
            stock: StockConfig::default(),
            stations: DEFAULT_FAIL_PROBABILITIES
                .iter()
                .map(|&p| StationConfig::with_fail_probability(p))
                .collect(),
            route: Stage::standard_route(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Seed for the deterministic RNG.
    pub seed: u64,
    /// Virtual-time horizon, in model time units.
    pub horizon: f64,
    /// Hard stop after this many scheduler events.
    pub max_events: u64,
    /// Stop admitting items after this many (unbounded when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    /// Record the per-item station trace.
    pub trace_items: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            horizon: 5000.0,
            max_events: 50_000_000,
            max_items: None,
            trace_items: false,
        }
    }
}

/// Item inter-arrival distribution: |Normal(mean, std_dev)|.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArrivalConfig {
    pub mean: f64,
    pub std_dev: f64,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            mean: 3.0,
            std_dev: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Standard deviation of every station's processing time.
    pub std_dev: f64,
    /// A failure trial is drawn once per this many completed items.
    pub failure_check_interval: u32,
    /// Probability that a finished item is classified faulty.
    pub faulty_probability: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            std_dev: 1.0,
            failure_check_interval: 5,
            faulty_probability: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StockConfig {
    pub initial_level: u64,
    /// Restock starts when the bin level drops below this.
    pub restock_threshold: u64,
    pub restock_quantity: u64,
    /// Sleep between bin checks while stock is sufficient.
    pub idle_poll_interval: f64,
    /// Size of the restock-device pool shared by all stations.
    pub devices: usize,
    pub delay_mean: f64,
    pub delay_std_dev: f64,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            initial_level: 25,
            restock_threshold: 5,
            restock_quantity: 25,
            idle_poll_interval: 1.0,
            devices: 3,
            delay_mean: 2.0,
            delay_std_dev: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    pub fail_probability: f64,
    pub work_time_mean: f64,
    pub repair_time_mean: f64,
}

impl StationConfig {
    pub fn with_fail_probability(fail_probability: f64) -> Self {
        Self {
            fail_probability,
            ..Self::default()
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            fail_probability: 0.0,
            work_time_mean: 4.0,
            repair_time_mean: 3.0,
        }
    }
}

/// One step of an item's route. Station ids are 1-based.
///
/// Written as a list of station ids: `[2]` is a single station, `[4, 5]` an
/// alternate-path pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub enum Stage {
    /// Acquire, process and release one station.
    Station(u32),
    /// Both stations process the item; whichever is granted first goes first.
    Either(u32, u32),
}

impl Stage {
    /// `1, 2, 3, {4|5}, 6`
    pub fn standard_route() -> Vec<Stage> {
        vec![
            Stage::Station(1),
            Stage::Station(2),
            Stage::Station(3),
            Stage::Either(4, 5),
            Stage::Station(6),
        ]
    }

    fn station_ids(self) -> impl Iterator<Item = u32> {
        let (a, b) = match self {
            Stage::Station(id) => (id, None),
            Stage::Either(first, second) => (first, Some(second)),
        };
        std::iter::once(a).chain(b)
    }
}

impl TryFrom<Vec<u32>> for Stage {
    type Error = String;

    fn try_from(ids: Vec<u32>) -> Result<Self, Self::Error> {
        match ids.as_slice() {
            [id] => Ok(Stage::Station(*id)),
            [first, second] => Ok(Stage::Either(*first, *second)),
            other => Err(format!(
                "a stage lists one or two stations, got {}",
                other.len()
            )),
        }
    }
}

impl From<Stage> for Vec<u32> {
    fn from(stage: Stage) -> Self {
        stage.station_ids().collect()
    }
}

impl FactoryConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Reads exactly one TOML file, without layering.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A line where no station ever breaks down.
    pub fn reliable() -> Self {
        let mut config = Self::default();
        for station in &mut config.stations {
            station.fail_probability = 0.0;
        }
        config
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.run.seed = seed;
        self
    }

    pub fn with_horizon(mut self, horizon: f64) -> Self {
        self.run.horizon = horizon;
        self
    }

    pub fn with_max_items(mut self, max_items: u64) -> Self {
        self.run.max_items = Some(max_items);
        self
    }

    pub fn with_item_traces(mut self) -> Self {
        self.run.trace_items = true;
        self
    }

    /// Rejects configurations the simulation cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("run.horizon", self.run.horizon)?;
        if self.run.max_events == 0 {
            return Err(ConfigError::invalid("run.max_events", "must be at least 1"));
        }

        positive("arrivals.mean", self.arrivals.mean)?;
        non_negative("arrivals.std_dev", self.arrivals.std_dev)?;

        non_negative("processing.std_dev", self.processing.std_dev)?;
        probability("processing.faulty_probability", self.processing.faulty_probability)?;
        if self.processing.failure_check_interval == 0 {
            return Err(ConfigError::invalid(
                "processing.failure_check_interval",
                "must be at least 1",
            ));
        }

        if self.stock.devices == 0 {
            return Err(ConfigError::invalid("stock.devices", "must be at least 1"));
        }
        if self.stock.restock_threshold == 0 {
            return Err(ConfigError::invalid(
                "stock.restock_threshold",
                "must be at least 1",
            ));
        }
        if self.stock.restock_quantity == 0 {
            return Err(ConfigError::invalid(
                "stock.restock_quantity",
                "must be at least 1",
            ));
        }
        positive("stock.idle_poll_interval", self.stock.idle_poll_interval)?;
        non_negative("stock.delay_mean", self.stock.delay_mean)?;
        non_negative("stock.delay_std_dev", self.stock.delay_std_dev)?;

        if self.stations.is_empty() {
            return Err(ConfigError::invalid("stations", "at least one station is required"));
        }
        for (index, station) in self.stations.iter().enumerate() {
            let id = index + 1;
            probability(
                &format!("stations[{id}].fail_probability"),
                station.fail_probability,
            )?;
            non_negative(
                &format!("stations[{id}].work_time_mean"),
                station.work_time_mean,
            )?;
            positive(
                &format!("stations[{id}].repair_time_mean"),
                station.repair_time_mean,
            )?;
        }

        self.validate_route()
    }

    fn validate_route(&self) -> Result<(), ConfigError> {
        if self.route.is_empty() {
            return Err(ConfigError::invalid("route", "must contain at least one stage"));
        }
        let count = self.stations.len() as u32;
        let mut seen = vec![false; self.stations.len()];
        for stage in &self.route {
            if let Stage::Either(a, b) = *stage {
                if a == b {
                    return Err(ConfigError::invalid(
                        "route",
                        format!("alternate pair uses station {a} twice"),
                    ));
                }
            }
            for id in stage.station_ids() {
                if id == 0 || id > count {
                    return Err(ConfigError::invalid(
                        "route",
                        format!("station {id} does not exist (1..={count})"),
                    ));
                }
                let slot = &mut seen[(id - 1) as usize];
                if *slot {
                    return Err(ConfigError::invalid(
                        "route",
                        format!("station {id} appears more than once"),
                    ));
                }
                *slot = true;
            }
        }
        Ok(())
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(
            field,
            format!("must be finite and >= 0, got {value}"),
        ));
    }
    Ok(())
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(
            field,
            format!("must be finite and > 0, got {value}"),
        ));
    }
    Ok(())
}

fn probability(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("must be within [0, 1], got {value}"),
        ));
    }
    Ok(())
}
