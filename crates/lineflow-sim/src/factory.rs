//! The production line: stations, routing and item accounting.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use lineflow_config::{FactoryConfig, Stage};
use serde::Serialize;

use crate::SimError;
use crate::clock::{ns_to_units, units_to_ns};
use crate::runtime::Sim;
use crate::sampling::SharedSampler;
use crate::station::{RestockPolicy, StationId, Workstation};
use crate::sync::{Resource, Winner, race};

/// Sequence number of an item, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of the final quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Faulty,
}

/// A station an item finished at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Visit {
    pub station: StationId,
    pub finished_ns: u64,
}

/// The path one item took through the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemTrace {
    pub item: ItemId,
    pub entered_ns: u64,
    pub visits: Vec<Visit>,
    pub quality: Quality,
}

impl ItemTrace {
    /// Station ids in visiting order.
    pub fn stations(&self) -> Vec<u32> {
        self.visits.iter().map(|visit| visit.station.get()).collect()
    }
}

/// Line-wide totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FactoryCounters {
    /// Items admitted by the arrival generator.
    pub items_started: u64,
    /// Items that passed the quality check.
    pub good_output: u64,
    /// Items that failed the quality check.
    pub faulty_output: u64,
}

impl FactoryCounters {
    pub fn items_completed(&self) -> u64 {
        self.good_output + self.faulty_output
    }
}

/// Owns the stations and runs the arrival generator and per-item routing.
pub struct Factory {
    sim: Sim,
    stations: Vec<Rc<Workstation>>,
    devices: Resource,
    route: Vec<Stage>,
    sampler: SharedSampler,
    restock: RestockPolicy,
    max_items: Option<u64>,
    trace_items: bool,
    counters: RefCell<FactoryCounters>,
    traces: RefCell<Vec<ItemTrace>>,
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("stations", &self.stations)
            .field("devices", &self.devices)
            .field("route", &self.route)
            .field("counters", &*self.counters.borrow())
            .finish_non_exhaustive()
    }
}

impl Factory {
    /// Builds the line. Nothing runs until [`Factory::start`].
    pub fn new(
        sim: &Sim,
        config: &FactoryConfig,
        sampler: SharedSampler,
    ) -> Result<Rc<Self>, SimError> {
        config.validate()?;

        let stations = config
            .stations
            .iter()
            .zip(1..)
            .map(|(station, id)| {
                Rc::new(Workstation::new(
                    sim,
                    StationId::new(id),
                    station,
                    &config.stock,
                    config.processing.failure_check_interval,
                    Rc::clone(&sampler),
                ))
            })
            .collect();

        Ok(Rc::new(Self {
            sim: sim.clone(),
            stations,
            devices: Resource::new(sim, config.stock.devices),
            route: config.route.clone(),
            sampler,
            restock: RestockPolicy::from_config(&config.stock),
            max_items: config.run.max_items,
            trace_items: config.run.trace_items,
            counters: RefCell::new(FactoryCounters::default()),
            traces: RefCell::new(Vec::new()),
        }))
    }

    /// Spawns one restock loop per station, then the arrival generator.
    pub fn start(self: &Rc<Self>) {
        for station in &self.stations {
            let (station, devices) = (Rc::clone(station), self.devices.clone());
            let policy = self.restock;
            self.sim
                .spawn(async move { station.restock_loop(devices, policy).await });
        }

        let factory = Rc::clone(self);
        self.sim.spawn(async move { factory.admit_items().await });
    }

    async fn admit_items(self: Rc<Self>) {
        loop {
            let item = {
                let mut counters = self.counters.borrow_mut();
                if self
                    .max_items
                    .is_some_and(|max| counters.items_started >= max)
                {
                    tracing::debug!(
                        started = counters.items_started,
                        "arrival limit reached"
                    );
                    return;
                }
                counters.items_started += 1;
                ItemId::new(counters.items_started)
            };

            let gap = units_to_ns(self.sampler.borrow_mut().inter_arrival());
            self.sim.after(gap).await;

            let factory = Rc::clone(&self);
            self.sim.spawn(async move { factory.route_item(item).await });
        }
    }

    async fn route_item(self: Rc<Self>, item: ItemId) {
        let entered_ns = self.sim.now();
        let mut visits = Vec::new();

        for stage in &self.route {
            match *stage {
                Stage::Station(id) => {
                    let station = self.station(StationId::new(id));
                    station.visit(item).await;
                    visits.push(self.visited(station));
                }
                Stage::Either(a, b) => {
                    let first = self.station(StationId::new(a));
                    let second = self.station(StationId::new(b));
                    let requested_at = self.sim.now();

                    let (lead, follow) = match race(first.request(), second.request()).await {
                        Winner::First(guard) => {
                            first.serve(item, guard, requested_at).await;
                            (first, second)
                        }
                        Winner::Second(guard) => {
                            second.serve(item, guard, requested_at).await;
                            (second, first)
                        }
                    };
                    visits.push(self.visited(lead));

                    follow.visit(item).await;
                    visits.push(self.visited(follow));
                }
            }
        }

        let quality = if self.sampler.borrow_mut().is_faulty(item) {
            Quality::Faulty
        } else {
            Quality::Good
        };
        {
            let mut counters = self.counters.borrow_mut();
            match quality {
                Quality::Good => counters.good_output += 1,
                Quality::Faulty => counters.faulty_output += 1,
            }
        }
        tracing::debug!(
            item = %item,
            quality = ?quality,
            time = ns_to_units(self.sim.now()),
            "item completed"
        );

        if self.trace_items {
            self.traces.borrow_mut().push(ItemTrace {
                item,
                entered_ns,
                visits,
                quality,
            });
        }
    }

    fn visited(&self, station: &Workstation) -> Visit {
        Visit {
            station: station.id(),
            finished_ns: self.sim.now(),
        }
    }

    /// # Panics
    ///
    /// Panics if `id` is not a station of this line.
    pub fn station(&self, id: StationId) -> &Rc<Workstation> {
        &self.stations[id.index()]
    }

    pub fn stations(&self) -> &[Rc<Workstation>] {
        &self.stations
    }

    /// The shared restock device pool.
    pub fn devices(&self) -> &Resource {
        &self.devices
    }

    pub fn counters(&self) -> FactoryCounters {
        *self.counters.borrow()
    }

    /// Traces of completed items, in completion order. Empty unless item
    /// tracing is enabled.
    pub fn traces(&self) -> Ref<'_, [ItemTrace]> {
        Ref::map(self.traces.borrow(), Vec::as_slice)
    }

    pub fn now(&self) -> u64 {
        self.sim.now()
    }
}
