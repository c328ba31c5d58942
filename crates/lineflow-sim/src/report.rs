//! Serializable snapshot of a run.

use serde::Serialize;

use crate::SimError;
use crate::clock::ns_to_units;
use crate::factory::{Factory, ItemTrace};
use crate::station::{StationCounters, StationId, StationState};
use crate::telemetry::StatusHistory;

#[derive(Debug, Clone, Serialize)]
pub struct StationReport {
    pub id: StationId,
    pub fail_probability: f64,
    pub state: StationState,
    pub restocking: bool,
    pub bin_level: u64,
    pub capacity: usize,
    pub peak_holders: usize,
    #[serde(flatten)]
    pub counters: StationCounters,
    /// Fraction of the elapsed time spent processing.
    pub utilization: f64,
    pub history: StatusHistory,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactoryReport {
    pub seed: u64,
    pub time_ns: u64,
    /// `time_ns` in model time units.
    pub time: f64,
    pub items_started: u64,
    pub items_completed: u64,
    pub good_output: u64,
    pub faulty_output: u64,
    pub restock_devices: usize,
    pub restock_peak_holders: usize,
    pub stations: Vec<StationReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub item_traces: Vec<ItemTrace>,
}

impl FactoryReport {
    /// Captures the current state of `factory`.
    pub fn capture(factory: &Factory, seed: u64) -> Self {
        let time_ns = factory.now();
        let counters = factory.counters();

        let stations = factory
            .stations()
            .iter()
            .map(|station| {
                let counters = station.counters();
                StationReport {
                    id: station.id(),
                    fail_probability: station.fail_probability(),
                    state: station.state(),
                    restocking: station.is_restocking(),
                    bin_level: station.bin_level(),
                    capacity: station.resource().capacity(),
                    peak_holders: station.resource().peak_holders(),
                    counters,
                    utilization: ratio(counters.busy_ns, time_ns),
                    history: station.history().clone(),
                }
            })
            .collect();

        Self {
            seed,
            time_ns,
            time: ns_to_units(time_ns),
            items_started: counters.items_started,
            items_completed: counters.items_completed(),
            good_output: counters.good_output,
            faulty_output: counters.faulty_output,
            restock_devices: factory.devices().capacity(),
            restock_peak_holders: factory.devices().peak_holders(),
            stations,
            item_traces: factory.traces().to_vec(),
        }
    }

    pub fn station(&self, id: u32) -> Option<&StationReport> {
        self.stations.iter().find(|station| station.id.get() == id)
    }

    pub fn total_breakdowns(&self) -> u64 {
        self.stations
            .iter()
            .map(|station| station.counters.breakdowns)
            .sum()
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, SimError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
