//! Station status history.
//!
//! Each station records the start and end of every stretch it spends
//! operational, broken down or waiting for a restock. The history is an
//! append-only list of edges; turning it into utilisation figures or charts
//! is left to whoever reads the report.

use serde::Serialize;

/// What a station is doing during an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Processing an item.
    Operational,
    /// Broken down and under repair.
    Down,
    /// Its bin is low and a restock is underway.
    WaitingForRestock,
}

/// Whether an interval started or finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Began,
    Ended,
}

/// One recorded status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub time_ns: u64,
    pub status: Status,
    pub edge: Edge,
}

/// Time-ordered list of status changes of one station.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusHistory {
    events: Vec<StatusEvent>,
}

impl StatusHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event. Timestamps must not decrease.
    pub fn record(&mut self, time_ns: u64, status: Status, edge: Edge) {
        debug_assert!(
            self.events.last().is_none_or(|last| last.time_ns <= time_ns),
            "status history must be recorded in time order"
        );
        self.events.push(StatusEvent {
            time_ns,
            status,
            edge,
        });
    }

    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Counts events with the given status and edge.
    pub fn count(&self, status: Status, edge: Edge) -> usize {
        self.events
            .iter()
            .filter(|event| event.status == status && event.edge == edge)
            .count()
    }

    /// True when timestamps never decrease.
    pub fn is_time_ordered(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].time_ns <= pair[1].time_ns)
    }

    /// True when, per status, every `Ended` closes an open `Began` and
    /// intervals of the same status never nest.
    pub fn is_well_nested(&self) -> bool {
        let mut open = [false; 3];
        self.events.iter().all(|event| {
            let slot = &mut open[event.status as usize];
            match event.edge {
                Edge::Began if !*slot => {
                    *slot = true;
                    true
                }
                Edge::Ended if *slot => {
                    *slot = false;
                    true
                }
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_status_and_edge() {
        let mut history = StatusHistory::new();
        history.record(3, Status::Operational, Edge::Began);
        history.record(7, Status::Operational, Edge::Ended);
        history.record(7, Status::Down, Edge::Began);
        history.record(9, Status::Down, Edge::Ended);

        assert_eq!(history.len(), 4);
        assert_eq!(history.count(Status::Down, Edge::Began), 1);
        assert_eq!(history.count(Status::WaitingForRestock, Edge::Began), 0);
        assert!(history.is_time_ordered());
        assert!(history.is_well_nested());
    }

    #[test]
    fn unmatched_end_is_not_well_nested() {
        let mut history = StatusHistory::new();
        history.record(1, Status::Down, Edge::Ended);
        assert!(!history.is_well_nested());
    }

    #[test]
    fn overlapping_different_statuses_are_allowed() {
        let mut history = StatusHistory::new();
        history.record(1, Status::WaitingForRestock, Edge::Began);
        history.record(2, Status::Operational, Edge::Began);
        history.record(3, Status::WaitingForRestock, Edge::Ended);
        history.record(6, Status::Operational, Edge::Ended);
        assert!(history.is_well_nested());
    }

    #[test]
    fn serializes_as_a_list() {
        let mut history = StatusHistory::new();
        history.record(5, Status::WaitingForRestock, Edge::Began);
        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(
            json,
            r#"[{"time_ns":5,"status":"waiting_for_restock","edge":"began"}]"#
        );
    }
}
