//! Error types for simulation runs.

use lineflow_config::ConfigError;
use thiserror::Error;

/// Errors that can stop a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// The configuration cannot be simulated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A correctness property failed after the run.
    #[error("invariant '{invariant}' violated at {time_ns}ns: {message}")]
    InvariantViolation {
        invariant: String,
        message: String,
        time_ns: u64,
    },

    /// The report could not be rendered.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}
