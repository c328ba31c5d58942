//! Event queue for the discrete-event scheduler.
//!
//! Events are ordered by timestamp, then by scheduling order. Two events at
//! the same instant therefore fire in the order they were scheduled, which is
//! what makes a run reproducible from its seed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::runtime::TaskId;

/// Identifier of a scheduled event.
///
/// Ids are assigned from a monotonically increasing counter, so among events
/// with equal timestamps a smaller id always fires first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// What happens when an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Poll the given task.
    Resume(TaskId),
}

/// A scheduled event.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub time_ns: u64,
    pub kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    // Reversed: BinaryHeap is a max-heap and the earliest event must surface.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time_ns
            .cmp(&self.time_ns)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Priority queue of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    next_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event at an absolute time.
    pub fn schedule(&mut self, time_ns: u64, kind: EventKind) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.heap.push(Event { id, time_ns, kind });
        id
    }

    /// Removes and returns the earliest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    /// Returns the time of the next event, if any.
    pub fn next_time(&self) -> Option<u64> {
        self.heap.peek().map(|event| event.time_ns)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
