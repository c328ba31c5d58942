//! Workstation model.
//!
//! A workstation is a unit-capacity [`Resource`] with a parts bin, a
//! breakdown/repair cycle and a background restock loop. Items hold the
//! station while they are processed; the breakdown that may follow the work
//! happens while the item still holds it, so the next item waits for the
//! repair.

use std::cell::{Ref, RefCell};
use std::fmt;

use lineflow_config::{StationConfig, StockConfig};
use serde::Serialize;

use crate::clock::{ns_to_units, units_to_ns};
use crate::factory::ItemId;
use crate::runtime::Sim;
use crate::sampling::SharedSampler;
use crate::sync::{Container, Gate, Request, Resource, ResourceGuard};
use crate::telemetry::{Edge, Status, StatusHistory};

/// 1-based station number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StationId(u32);

impl StationId {
    pub fn new(id: u32) -> Self {
        debug_assert!(id > 0, "station ids start at 1");
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a station is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StationState {
    Idle,
    Operational,
    Down,
}

/// Running totals of one station. Durations are nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StationCounters {
    pub items_processed: u64,
    pub busy_ns: u64,
    pub breakdowns: u64,
    pub downtime_ns: u64,
    pub restocks: u64,
    pub restock_ns: u64,
    /// Time items spent between requesting the station and holding it.
    pub queue_wait_ns: u64,
}

/// When and how much to restock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestockPolicy {
    /// Restock once the bin level drops below this.
    pub threshold: u64,
    pub quantity: u64,
    /// How long the loop sleeps while the bin is stocked.
    pub poll_interval_ns: u64,
}

impl RestockPolicy {
    pub fn from_config(stock: &StockConfig) -> Self {
        Self {
            threshold: stock.restock_threshold,
            quantity: stock.restock_quantity,
            poll_interval_ns: units_to_ns(stock.idle_poll_interval),
        }
    }
}

#[derive(Debug, Default)]
struct Condition {
    processing: bool,
    restocking: bool,
    items_since_check: u32,
}

pub struct Workstation {
    id: StationId,
    sim: Sim,
    fail_probability: f64,
    check_interval: u32,
    resource: Resource,
    bin: Container,
    repaired: Gate,
    sampler: SharedSampler,
    condition: RefCell<Condition>,
    counters: RefCell<StationCounters>,
    history: RefCell<StatusHistory>,
}

impl fmt::Debug for Workstation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workstation")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("bin", &self.bin)
            .field("counters", &*self.counters.borrow())
            .finish_non_exhaustive()
    }
}

impl Workstation {
    pub fn new(
        sim: &Sim,
        id: StationId,
        config: &StationConfig,
        stock: &StockConfig,
        check_interval: u32,
        sampler: SharedSampler,
    ) -> Self {
        Self {
            id,
            sim: sim.clone(),
            fail_probability: config.fail_probability,
            check_interval: check_interval.max(1),
            resource: Resource::new(sim, 1),
            bin: Container::new(sim, stock.initial_level),
            repaired: Gate::new(sim, true),
            sampler,
            condition: RefCell::new(Condition::default()),
            counters: RefCell::new(StationCounters::default()),
            history: RefCell::new(StatusHistory::new()),
        }
    }

    pub fn id(&self) -> StationId {
        self.id
    }

    pub fn fail_probability(&self) -> f64 {
        self.fail_probability
    }

    pub fn state(&self) -> StationState {
        if self.is_broken() {
            return StationState::Down;
        }
        if self.condition.borrow().processing {
            StationState::Operational
        } else {
            StationState::Idle
        }
    }

    pub fn is_broken(&self) -> bool {
        !self.repaired.is_open()
    }

    pub fn is_restocking(&self) -> bool {
        self.condition.borrow().restocking
    }

    pub fn bin_level(&self) -> u64 {
        self.bin.level()
    }

    pub fn counters(&self) -> StationCounters {
        *self.counters.borrow()
    }

    pub fn history(&self) -> Ref<'_, StatusHistory> {
        self.history.borrow()
    }

    /// The unit-capacity resource items queue on.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn request(&self) -> Request {
        self.resource.request()
    }

    /// Acquires the station, processes `item` and releases it.
    pub async fn visit(&self, item: ItemId) {
        let requested_at = self.sim.now();
        let guard = self.request().await;
        self.serve(item, guard, requested_at).await;
    }

    /// Processes `item` on a station acquired through `guard`, then releases
    /// it. `requested_at` is when the request was made.
    pub async fn serve(&self, item: ItemId, guard: ResourceGuard, requested_at: u64) {
        let waited = self.sim.now().saturating_sub(requested_at);
        self.counters.borrow_mut().queue_wait_ns += waited;
        self.process(item).await;
        drop(guard);
    }

    /// One unit of work: wait out a repair, take a part, work, and run the
    /// periodic failure check. The caller holds the station throughout.
    pub async fn process(&self, item: ItemId) {
        if self.is_broken() {
            self.repaired.wait_open().await;
        }

        self.bin.withdraw(1).await;

        let duration = units_to_ns(self.sampler.borrow_mut().processing_time(self.id));
        let started = self.sim.now();
        self.condition.borrow_mut().processing = true;
        self.record(Status::Operational, Edge::Began);

        self.sim.after(duration).await;

        self.record(Status::Operational, Edge::Ended);
        self.condition.borrow_mut().processing = false;
        {
            let mut counters = self.counters.borrow_mut();
            counters.busy_ns += self.sim.now() - started;
            counters.items_processed += 1;
        }
        tracing::debug!(
            station = %self.id,
            item = %item,
            time = ns_to_units(self.sim.now()),
            "item processed"
        );

        if self.due_for_failure_check() && self.sampler.borrow_mut().breaks_down(self.id) {
            self.break_down().await;
        }
    }

    fn due_for_failure_check(&self) -> bool {
        let mut condition = self.condition.borrow_mut();
        condition.items_since_check += 1;
        if condition.items_since_check >= self.check_interval {
            condition.items_since_check = 0;
            true
        } else {
            false
        }
    }

    async fn break_down(&self) {
        let broke_at = self.sim.now();
        self.repaired.close();
        self.counters.borrow_mut().breakdowns += 1;
        self.record(Status::Down, Edge::Began);

        let repair = units_to_ns(self.sampler.borrow_mut().repair_time(self.id));
        tracing::info!(
            station = %self.id,
            time = ns_to_units(broke_at),
            repair = ns_to_units(repair),
            "station broke down"
        );

        self.sim.after(repair).await;

        self.counters.borrow_mut().downtime_ns += self.sim.now() - broke_at;
        self.record(Status::Down, Edge::Ended);
        self.repaired.open();
        tracing::info!(
            station = %self.id,
            time = ns_to_units(self.sim.now()),
            "station repaired"
        );
    }

    /// Keeps the bin stocked for as long as the simulation runs.
    ///
    /// While the level is below the threshold it takes a device from the
    /// shared pool, waits out the delivery, deposits and releases the device.
    /// Otherwise it sleeps for the poll interval.
    pub async fn restock_loop(&self, devices: Resource, policy: RestockPolicy) {
        loop {
            let level = self.bin.level();
            if level >= policy.threshold {
                self.sim.after(policy.poll_interval_ns).await;
                continue;
            }

            let began = self.sim.now();
            self.condition.borrow_mut().restocking = true;
            self.record(Status::WaitingForRestock, Edge::Began);
            tracing::trace!(station = %self.id, level, "restock requested");

            let device = devices.request().await;
            let delay = units_to_ns(self.sampler.borrow_mut().restock_delay(self.id));
            self.sim.after(delay).await;
            self.bin.deposit(policy.quantity);
            drop(device);

            self.record(Status::WaitingForRestock, Edge::Ended);
            self.condition.borrow_mut().restocking = false;
            {
                let mut counters = self.counters.borrow_mut();
                counters.restocks += 1;
                counters.restock_ns += self.sim.now() - began;
            }
            tracing::trace!(
                station = %self.id,
                level = self.bin.level(),
                "bin restocked"
            );
        }
    }

    fn record(&self, status: Status, edge: Edge) {
        self.history
            .borrow_mut()
            .record(self.sim.now(), status, edge);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::clock::units_to_ns as ns;
    use crate::runtime::Runtime;
    use crate::sampling::FixedSampler;

    fn station(sim: &Sim, sampler: FixedSampler, check_interval: u32) -> Rc<Workstation> {
        Rc::new(Workstation::new(
            sim,
            StationId::new(1),
            &StationConfig::default(),
            &StockConfig::default(),
            check_interval,
            Rc::new(RefCell::new(sampler)),
        ))
    }

    fn visit_at(sim: &Sim, station: &Rc<Workstation>, item: u64, at: f64) {
        let (s, st) = (sim.clone(), Rc::clone(station));
        sim.spawn(async move {
            s.after(ns(at)).await;
            st.visit(ItemId::new(item)).await;
        });
    }

    #[test]
    fn single_item_is_processed_and_takes_a_part() {
        let mut runtime = Runtime::new();
        let sim = runtime.handle();
        let st = station(&sim, FixedSampler::new(), 5);

        visit_at(&sim, &st, 1, 3.0);
        runtime.run_until(ns(5.0), u64::MAX);
        assert_eq!(st.state(), StationState::Operational);
        assert_eq!(st.bin_level(), 24);

        runtime.run_until(ns(20.0), u64::MAX);
        let counters = st.counters();
        assert_eq!(counters.items_processed, 1);
        assert_eq!(counters.busy_ns, ns(4.0));
        assert_eq!(counters.queue_wait_ns, 0);
        assert_eq!(st.state(), StationState::Idle);
        assert_eq!(st.history().count(Status::Operational, Edge::Ended), 1);
    }

    #[test]
    fn breakdown_blocks_the_next_item_until_repaired() {
        let mut runtime = Runtime::new();
        let sim = runtime.handle();
        let sampler = FixedSampler {
            breakdown: true,
            repair: 5.0,
            ..FixedSampler::new()
        };
        let st = station(&sim, sampler, 1);

        visit_at(&sim, &st, 1, 3.0);
        visit_at(&sim, &st, 2, 6.0);

        runtime.run_until(ns(8.0), u64::MAX);
        assert_eq!(st.state(), StationState::Down);
        assert!(st.is_broken());

        runtime.run_until(ns(12.5), u64::MAX);
        let counters = st.counters();
        assert_eq!(counters.breakdowns, 1);
        assert_eq!(counters.downtime_ns, ns(5.0));
        assert_eq!(counters.queue_wait_ns, ns(6.0));

        let history = st.history();
        let times: Vec<_> = history
            .events()
            .iter()
            .map(|e| (e.time_ns, e.status, e.edge))
            .collect();
        assert_eq!(
            times,
            vec![
                (ns(3.0), Status::Operational, Edge::Began),
                (ns(7.0), Status::Operational, Edge::Ended),
                (ns(7.0), Status::Down, Edge::Began),
                (ns(12.0), Status::Down, Edge::Ended),
                (ns(12.0), Status::Operational, Edge::Began),
            ]
        );
    }

    #[test]
    fn processing_on_a_broken_station_waits_for_repair() {
        let mut runtime = Runtime::new();
        let sim = runtime.handle();
        let sampler = FixedSampler {
            breakdown: true,
            repair: 5.0,
            ..FixedSampler::new()
        };
        let st = station(&sim, sampler, 1);

        visit_at(&sim, &st, 1, 3.0);

        // Bypasses the resource to observe the repair signal directly.
        let (s, other) = (sim.clone(), Rc::clone(&st));
        sim.spawn(async move {
            s.after(ns(8.0)).await;
            other.process(ItemId::new(2)).await;
        });

        runtime.run_until(ns(13.0), u64::MAX);
        let began: Vec<_> = st
            .history()
            .events()
            .iter()
            .filter(|e| e.status == Status::Operational && e.edge == Edge::Began)
            .map(|e| e.time_ns)
            .collect();
        assert_eq!(began, vec![ns(3.0), ns(12.0)]);
    }

    #[test]
    fn failure_check_runs_every_interval() {
        let mut runtime = Runtime::new();
        let sim = runtime.handle();
        let sampler = FixedSampler {
            breakdown: true,
            repair: 1.0,
            ..FixedSampler::new()
        };
        let st = station(&sim, sampler, 5);

        let worker = Rc::clone(&st);
        sim.spawn(async move {
            for item in 1..=10 {
                worker.visit(ItemId::new(item)).await;
            }
        });

        runtime.run_until(ns(1_000.0), u64::MAX);
        let counters = st.counters();
        assert_eq!(counters.items_processed, 10);
        assert_eq!(counters.breakdowns, 2);
        assert_eq!(counters.downtime_ns, ns(2.0));
    }

    #[test]
    fn low_bin_is_restocked_through_the_device_pool() {
        let mut runtime = Runtime::new();
        let sim = runtime.handle();
        let stock = StockConfig {
            initial_level: 0,
            ..StockConfig::default()
        };
        let st = Rc::new(Workstation::new(
            &sim,
            StationId::new(3),
            &StationConfig::default(),
            &stock,
            5,
            Rc::new(RefCell::new(FixedSampler {
                restock_delay: 10.0,
                ..FixedSampler::new()
            })),
        ));
        let devices = Resource::new(&sim, 3);

        let (looped, pool) = (Rc::clone(&st), devices.clone());
        let policy = RestockPolicy::from_config(&stock);
        sim.spawn(async move { looped.restock_loop(pool, policy).await });
        visit_at(&sim, &st, 1, 3.0);

        runtime.run_until(ns(5.0), u64::MAX);
        assert!(st.is_restocking());
        assert_eq!(devices.holders(), 1);
        assert_eq!(st.state(), StationState::Idle);

        runtime.run_until(ns(10.5), u64::MAX);
        assert!(!st.is_restocking());
        assert_eq!(devices.holders(), 0);
        assert_eq!(st.bin_level(), 24);
        assert_eq!(st.counters().restocks, 1);
        assert_eq!(st.counters().restock_ns, ns(10.0));

        let began = st
            .history()
            .events()
            .iter()
            .find(|e| e.status == Status::Operational)
            .map(|e| e.time_ns);
        assert_eq!(began, Some(ns(10.0)));
    }
}
