//! Virtual clock.
//!
//! Time is kept as integer nanoseconds of virtual time. One model time unit
//! (the unit every configured mean and horizon is expressed in) is one
//! simulated second, so `7.0` units is `7_000_000_000` ns. Integer time keeps
//! accumulated busy and down durations exact, and equal timestamps compare
//! equal regardless of the order in which durations were summed.

/// Nanoseconds per model time unit.
pub const NS_PER_UNIT: u64 = 1_000_000_000;

/// Converts a duration in model time units to nanoseconds.
///
/// Negative and NaN inputs become zero; the sampled distributions are floored
/// at zero anyway, this only makes the conversion total.
#[inline]
pub fn units_to_ns(units: f64) -> u64 {
    if units.is_nan() || units <= 0.0 {
        return 0;
    }
    (units * NS_PER_UNIT as f64).round() as u64
}

/// Converts nanoseconds to model time units.
#[inline]
pub fn ns_to_units(ns: u64) -> f64 {
    ns as f64 / NS_PER_UNIT as f64
}

/// Deterministic simulation clock.
///
/// Advances only when the scheduler moves it to the timestamp of the next
/// event, and never backwards.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ns: u64,
}

impl SimClock {
    /// Creates a new clock starting at time zero.
    pub fn new() -> Self {
        Self { now_ns: 0 }
    }

    /// Returns the current virtual time in nanoseconds.
    #[inline]
    pub fn now(&self) -> u64 {
        self.now_ns
    }

    /// Advances time to the given value.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `time_ns` is earlier than the current time.
    pub fn advance_to(&mut self, time_ns: u64) {
        debug_assert!(
            time_ns >= self.now_ns,
            "time cannot go backwards: current={}, target={}",
            self.now_ns,
            time_ns
        );
        self.now_ns = time_ns;
    }
}
