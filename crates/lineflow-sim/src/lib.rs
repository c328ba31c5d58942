//! # lineflow-sim: Deterministic simulation of a production line
//!
//! A discrete-event model of a multi-station line. Items arrive at random
//! intervals and visit stations in a configured order; stations draw parts
//! from a bin, break down now and then, and get their bins refilled by a
//! small pool of shared restock devices. Every random draw comes from one
//! seeded RNG, so a seed fully determines a run.
#![allow(clippy::future_not_send)] // Tasks run on one thread
#![cfg_attr(test, allow(clippy::float_cmp))] // Test assertions use exact float comparisons
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Simulation                               │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────────────┐   │
//! │  │ SimClock    │   │ EventQueue   │   │ Sampler (SimRng)     │   │
//! │  │ (virtual ns)│   │ (FIFO ties)  │   │ (seeded draws)       │   │
//! │  └─────────────┘   └──────────────┘   └──────────────────────┘   │
//! │                                                                    │
//! │  ┌──────────────────────────────────────────────────────────────┐ │
//! │  │ Runtime: tasks polled one at a time on Resume events          │ │
//! │  │   arrivals ─► item routing ─► Workstation 1..n                │ │
//! │  │   restock loop per station ─► shared device pool              │ │
//! │  └──────────────────────────────────────────────────────────────┘ │
//! │                                                                    │
//! │  ┌──────────────────────────────────────────────────────────────┐ │
//! │  │ FactoryReport ─► Invariant checkers                          │ │
//! │  └──────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use lineflow_config::FactoryConfig;
//! use lineflow_sim::Simulation;
//!
//! let config = FactoryConfig::default().with_seed(12345);
//! let mut sim = Simulation::new(config)?;
//! let summary = sim.run()?;
//! println!("{}", sim.report().to_json(true)?);
//! ```
//!
//! ## Key Concepts
//!
//! - **`Runtime`**: single-threaded executor whose wakeups are queued events
//! - **`Resource`** / **`Container`** / **`Gate`**: FIFO blocking primitives
//! - **`Workstation`**: a station with its bin, breakdowns and restock loop
//! - **`Factory`**: arrival generator and per-item routing
//! - **`InvariantChecker`**: post-run correctness checks

use std::cell::RefCell;
use std::rc::Rc;

use lineflow_config::FactoryConfig;
use serde::Serialize;

mod clock;
mod error;
mod event;
mod factory;
mod invariant;
mod report;
mod rng;
mod runtime;
mod sampling;
mod station;
pub mod sync;
mod telemetry;

pub use clock::{NS_PER_UNIT, SimClock, ns_to_units, units_to_ns};
pub use error::SimError;
pub use event::{Event, EventId, EventKind, EventQueue};
pub use factory::{Factory, FactoryCounters, ItemId, ItemTrace, Quality, Visit};
pub use invariant::{
    CapacityChecker, HistoryChecker, InvariantChecker, InvariantResult,
    OutputAccountingChecker, TimeBudgetChecker, check_report, standard_checkers,
};
pub use report::{FactoryReport, StationReport};
pub use rng::SimRng;
pub use runtime::{Delay, Runtime, Sim, StopReason, TaskId};
pub use sampling::{FixedSampler, Sampler, SharedSampler, StochasticSampler};
pub use station::{RestockPolicy, StationCounters, StationId, StationState, Workstation};
pub use telemetry::{Edge, Status, StatusEvent, StatusHistory};

// ============================================================================
// Simulation
// ============================================================================

/// A configured production line plus the runtime that drives it.
pub struct Simulation {
    config: FactoryConfig,
    runtime: Runtime,
    factory: Rc<Factory>,
}

impl Simulation {
    /// Creates a simulation drawing from the configured distributions.
    pub fn new(config: FactoryConfig) -> Result<Self, SimError> {
        config.validate()?;
        let sampler = StochasticSampler::new(&config)?;
        Self::with_sampler(config, sampler)
    }

    /// Creates a simulation with a custom source of timings.
    pub fn with_sampler<S>(config: FactoryConfig, sampler: S) -> Result<Self, SimError>
    where
        S: Sampler + 'static,
    {
        let runtime = Runtime::new();
        let sampler: SharedSampler = Rc::new(RefCell::new(sampler));
        let factory = Factory::new(&runtime.handle(), &config, sampler)?;
        factory.start();

        Ok(Self {
            config,
            runtime,
            factory,
        })
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Current virtual time in nanoseconds.
    pub fn now(&self) -> u64 {
        self.runtime.now()
    }

    pub fn events_processed(&self) -> u64 {
        self.runtime.events_processed()
    }

    /// Advances to `time_ns` without checking invariants. Can be called
    /// repeatedly with increasing times.
    pub fn run_until(&mut self, time_ns: u64) -> SimSummary {
        let stop = self.runtime.run_until(time_ns, self.config.run.max_events);
        if stop == StopReason::EventLimit {
            tracing::warn!(
                events = self.runtime.events_processed(),
                time = ns_to_units(self.now()),
                "event limit reached before the horizon"
            );
        }
        self.summary(stop)
    }

    /// Runs to the configured horizon and checks every invariant.
    pub fn run(&mut self) -> Result<SimSummary, SimError> {
        let summary = self.run_until(units_to_ns(self.config.run.horizon));
        check_report(&self.report())?;

        let counters = self.factory.counters();
        tracing::info!(
            seed = summary.seed,
            events = summary.events_processed,
            time = ns_to_units(summary.final_time_ns),
            started = counters.items_started,
            good = counters.good_output,
            faulty = counters.faulty_output,
            "simulation complete"
        );
        Ok(summary)
    }

    /// Snapshot of the line at the current time.
    pub fn report(&self) -> FactoryReport {
        FactoryReport::capture(&self.factory, self.config.run.seed)
    }

    fn summary(&self, stop: StopReason) -> SimSummary {
        SimSummary {
            events_processed: self.runtime.events_processed(),
            final_time_ns: self.runtime.now(),
            seed: self.config.run.seed,
            stop,
        }
    }
}

// ============================================================================
// Simulation Summary
// ============================================================================

/// Summary of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimSummary {
    /// Total number of events processed.
    pub events_processed: u64,
    /// Final simulation time (nanoseconds).
    pub final_time_ns: u64,
    /// Seed used for this run.
    pub seed: u64,
    /// Why the run stopped.
    pub stop: StopReason,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_runs_to_horizon() {
        let config = FactoryConfig::default().with_seed(42).with_horizon(200.0);
        let mut sim = Simulation::new(config).expect("valid config");

        let summary = sim.run().expect("invariants hold");
        assert_eq!(summary.stop, StopReason::Horizon);
        assert_eq!(summary.final_time_ns, units_to_ns(200.0));
        assert_eq!(summary.seed, 42);
        assert!(summary.events_processed > 0);
        assert!(sim.factory().counters().items_started > 0);
    }

    #[test]
    fn run_until_can_resume() {
        let config = FactoryConfig::default().with_seed(7);
        let mut sim = Simulation::new(config).expect("valid config");

        let first = sim.run_until(units_to_ns(50.0));
        let second = sim.run_until(units_to_ns(100.0));
        assert_eq!(first.final_time_ns, units_to_ns(50.0));
        assert_eq!(second.final_time_ns, units_to_ns(100.0));
        assert!(second.events_processed > first.events_processed);
    }

    #[test]
    fn event_limit_stops_early() {
        let mut config = FactoryConfig::default().with_seed(1);
        config.run.max_events = 100;
        let mut sim = Simulation::new(config).expect("valid config");

        let summary = sim.run().expect("invariants hold");
        assert_eq!(summary.stop, StopReason::EventLimit);
        assert_eq!(summary.events_processed, 100);
        assert!(summary.final_time_ns < units_to_ns(5_000.0));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = FactoryConfig::default();
        config.stations[2].fail_probability = 1.5;
        let err = Simulation::new(config).err().expect("invalid config");
        assert!(matches!(err, SimError::Config(_)));
        assert!(err.to_string().contains("stations[3].fail_probability"));
    }

    #[test]
    fn line_that_never_restocks_is_rejected() {
        let mut config = FactoryConfig::default();
        config.stock.restock_threshold = 0;
        let err = Simulation::with_sampler(config, FixedSampler::new())
            .err()
            .expect("invalid config");
        assert!(err.to_string().contains("stock.restock_threshold"));
    }

    #[test]
    fn report_serializes() {
        let config = FactoryConfig::default().with_seed(3).with_horizon(30.0);
        let mut sim = Simulation::new(config).expect("valid config");
        sim.run().expect("invariants hold");

        let json = sim.report().to_json(false).expect("serializes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["seed"], 3);
        assert_eq!(value["stations"].as_array().map(Vec::len), Some(6));
        assert!(value.get("item_traces").is_none());
    }
}
