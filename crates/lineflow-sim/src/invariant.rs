//! Invariant checkers for finished runs.
//!
//! Each checker inspects a [`FactoryReport`] and either passes or names the
//! property that failed with enough context to reproduce it.
//!
//! # Available Checkers
//!
//! - [`OutputAccountingChecker`]: completed items add up and never exceed
//!   started items
//! - [`TimeBudgetChecker`]: busy time plus downtime of a station never exceeds
//!   the run
//! - [`HistoryChecker`]: status histories are time-ordered and well nested
//! - [`CapacityChecker`]: no resource ever had more holders than capacity

use crate::SimError;
use crate::report::FactoryReport;

// ============================================================================
// Invariant Result
// ============================================================================

/// Result of an invariant check.
#[derive(Debug, Clone)]
pub enum InvariantResult {
    /// The invariant holds.
    Ok,
    /// The invariant is violated.
    Violated {
        /// Name of the violated invariant.
        invariant: String,
        /// Description of the violation.
        message: String,
        /// Additional context.
        context: Vec<(String, String)>,
    },
}

impl InvariantResult {
    /// Returns true if the invariant holds.
    pub fn is_ok(&self) -> bool {
        matches!(self, InvariantResult::Ok)
    }

    /// Converts to a `SimError` if violated.
    pub fn into_error(self, time_ns: u64) -> Option<SimError> {
        match self {
            InvariantResult::Ok => None,
            InvariantResult::Violated {
                invariant,
                message,
                context,
            } => {
                let message = if context.is_empty() {
                    message
                } else {
                    let context: Vec<String> =
                        context.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    format!("{message} ({})", context.join(", "))
                };
                Some(SimError::InvariantViolation {
                    invariant,
                    message,
                    time_ns,
                })
            }
        }
    }
}

fn violated(
    invariant: &str,
    message: String,
    context: Vec<(&str, String)>,
) -> InvariantResult {
    InvariantResult::Violated {
        invariant: invariant.to_string(),
        message,
        context: context
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    }
}

// ============================================================================
// Invariant Checker Trait
// ============================================================================

/// Trait for invariant checkers.
pub trait InvariantChecker {
    /// Returns the name of this checker.
    fn name(&self) -> &'static str;

    /// Checks the report.
    fn check(&self, report: &FactoryReport) -> InvariantResult;
}

/// Every checker in this module.
pub fn standard_checkers() -> Vec<Box<dyn InvariantChecker>> {
    vec![
        Box::new(OutputAccountingChecker),
        Box::new(TimeBudgetChecker),
        Box::new(HistoryChecker),
        Box::new(CapacityChecker),
    ]
}

/// Runs every standard checker and returns the first violation.
pub fn check_report(report: &FactoryReport) -> Result<(), SimError> {
    for checker in standard_checkers() {
        let result = checker.check(report);
        if let Some(err) = result.into_error(report.time_ns) {
            tracing::warn!(checker = checker.name(), error = %err, "invariant violated");
            return Err(err);
        }
    }
    Ok(())
}

// ============================================================================
// Output Accounting
// ============================================================================

/// `good + faulty == completed <= started`.
#[derive(Debug, Default)]
pub struct OutputAccountingChecker;

impl InvariantChecker for OutputAccountingChecker {
    fn name(&self) -> &'static str {
        "output_accounting"
    }

    fn check(&self, report: &FactoryReport) -> InvariantResult {
        if report.good_output + report.faulty_output != report.items_completed {
            return violated(
                "output_sum",
                "good and faulty output do not add up to completed items".to_string(),
                vec![
                    ("good", report.good_output.to_string()),
                    ("faulty", report.faulty_output.to_string()),
                    ("completed", report.items_completed.to_string()),
                ],
            );
        }
        if report.items_completed > report.items_started {
            return violated(
                "completed_le_started",
                format!(
                    "{} items completed but only {} started",
                    report.items_completed, report.items_started
                ),
                vec![],
            );
        }
        InvariantResult::Ok
    }
}

// ============================================================================
// Time Budget
// ============================================================================

/// Busy time plus downtime of each station fits within the elapsed time.
#[derive(Debug, Default)]
pub struct TimeBudgetChecker;

impl InvariantChecker for TimeBudgetChecker {
    fn name(&self) -> &'static str {
        "time_budget"
    }

    fn check(&self, report: &FactoryReport) -> InvariantResult {
        for station in &report.stations {
            let counters = &station.counters;
            if counters.busy_ns.saturating_add(counters.downtime_ns) > report.time_ns {
                return violated(
                    "station_time_budget",
                    format!("station {} accounted more time than elapsed", station.id),
                    vec![
                        ("busy_ns", counters.busy_ns.to_string()),
                        ("downtime_ns", counters.downtime_ns.to_string()),
                        ("elapsed_ns", report.time_ns.to_string()),
                    ],
                );
            }
        }
        InvariantResult::Ok
    }
}

// ============================================================================
// Status History
// ============================================================================

/// Histories are time-ordered, and intervals of one status never overlap.
#[derive(Debug, Default)]
pub struct HistoryChecker;

impl InvariantChecker for HistoryChecker {
    fn name(&self) -> &'static str {
        "status_history"
    }

    fn check(&self, report: &FactoryReport) -> InvariantResult {
        for station in &report.stations {
            if !station.history.is_time_ordered() {
                return violated(
                    "history_time_ordered",
                    format!("station {} history goes back in time", station.id),
                    vec![],
                );
            }
            if !station.history.is_well_nested() {
                return violated(
                    "history_well_nested",
                    format!("station {} history has unmatched intervals", station.id),
                    vec![("events", station.history.len().to_string())],
                );
            }
        }
        InvariantResult::Ok
    }
}

// ============================================================================
// Capacity
// ============================================================================

/// Stations never had more than one holder, the device pool never more than
/// its size.
#[derive(Debug, Default)]
pub struct CapacityChecker;

impl InvariantChecker for CapacityChecker {
    fn name(&self) -> &'static str {
        "capacity"
    }

    fn check(&self, report: &FactoryReport) -> InvariantResult {
        for station in &report.stations {
            if station.peak_holders > station.capacity {
                return violated(
                    "station_capacity",
                    format!("station {} exceeded its capacity", station.id),
                    vec![
                        ("peak", station.peak_holders.to_string()),
                        ("capacity", station.capacity.to_string()),
                    ],
                );
            }
        }
        if report.restock_peak_holders > report.restock_devices {
            return violated(
                "device_pool_capacity",
                "restock device pool exceeded its size".to_string(),
                vec![
                    ("peak", report.restock_peak_holders.to_string()),
                    ("devices", report.restock_devices.to_string()),
                ],
            );
        }
        InvariantResult::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::StationReport;
    use crate::station::{StationCounters, StationId, StationState};
    use crate::telemetry::{Edge, Status, StatusHistory};

    fn report() -> FactoryReport {
        FactoryReport {
            seed: 0,
            time_ns: 100,
            time: 100.0 / 1e9,
            items_started: 10,
            items_completed: 8,
            good_output: 7,
            faulty_output: 1,
            restock_devices: 3,
            restock_peak_holders: 2,
            stations: vec![StationReport {
                id: StationId::new(1),
                fail_probability: 0.0,
                state: StationState::Idle,
                restocking: false,
                bin_level: 25,
                capacity: 1,
                peak_holders: 1,
                counters: StationCounters {
                    busy_ns: 80,
                    downtime_ns: 10,
                    ..StationCounters::default()
                },
                utilization: 0.8,
                history: StatusHistory::new(),
            }],
            item_traces: Vec::new(),
        }
    }

    #[test]
    fn consistent_report_passes() {
        let report = report();
        for checker in standard_checkers() {
            assert!(checker.check(&report).is_ok(), "{} failed", checker.name());
        }
        assert!(check_report(&report).is_ok());
    }

    #[test]
    fn output_mismatch_is_reported() {
        let mut report = report();
        report.good_output = 8;
        let err = OutputAccountingChecker
            .check(&report)
            .into_error(report.time_ns)
            .unwrap();
        let text = err.to_string();
        assert!(text.contains("output_sum"), "{text}");
        assert!(text.contains("completed=8"), "{text}");
    }

    #[test]
    fn completed_beyond_started_is_reported() {
        let mut report = report();
        report.items_started = 5;
        assert!(!OutputAccountingChecker.check(&report).is_ok());
    }

    #[test]
    fn overlong_busy_time_is_reported() {
        let mut report = report();
        report.stations[0].counters.busy_ns = 101;
        assert!(!TimeBudgetChecker.check(&report).is_ok());
    }

    #[test]
    fn busy_and_down_time_are_budgeted_together() {
        let mut report = report();
        report.stations[0].counters.busy_ns = 60;
        report.stations[0].counters.downtime_ns = 60;

        let err = TimeBudgetChecker
            .check(&report)
            .into_error(report.time_ns)
            .unwrap();
        let text = err.to_string();
        assert!(text.contains("station_time_budget"), "{text}");
        assert!(text.contains("elapsed_ns=100"), "{text}");
    }

    #[test]
    fn unmatched_history_is_reported() {
        let mut report = report();
        report.stations[0]
            .history
            .record(5, Status::Down, Edge::Ended);
        assert!(!HistoryChecker.check(&report).is_ok());
    }

    #[test]
    fn over_capacity_is_reported() {
        let mut report = report();
        report.restock_peak_holders = 4;
        assert!(matches!(
            check_report(&report),
            Err(SimError::InvariantViolation { ref invariant, .. }) if invariant == "device_pool_capacity"
        ));
    }
}
