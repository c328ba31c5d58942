//! Sources of random durations and outcomes.
//!
//! The model never touches an RNG directly. Every draw goes through a
//! [`Sampler`], which makes it possible to replace the stochastic timings
//! with fixed ones and check exact schedules.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use lineflow_config::{ConfigError, FactoryConfig};
use rand_distr::{Exp, Normal};

use crate::SimError;
use crate::factory::ItemId;
use crate::rng::SimRng;
use crate::station::StationId;

/// Durations are in model time units.
pub trait Sampler {
    /// Time until the next item enters the line.
    fn inter_arrival(&mut self) -> f64;

    /// Time a station spends on one item.
    fn processing_time(&mut self, station: StationId) -> f64;

    /// Time to repair a broken station.
    fn repair_time(&mut self, station: StationId) -> f64;

    /// Time for a restock device to refill a bin.
    fn restock_delay(&mut self, station: StationId) -> f64;

    /// Outcome of a periodic failure check.
    fn breaks_down(&mut self, station: StationId) -> bool;

    /// Final quality check of a finished item.
    fn is_faulty(&mut self, item: ItemId) -> bool;
}

/// A sampler shared by every task of one run.
pub type SharedSampler = Rc<RefCell<dyn Sampler>>;

#[derive(Debug, Clone)]
struct StationDistributions {
    processing: Normal<f64>,
    repair: Exp<f64>,
    fail_probability: f64,
}

/// Draws from the configured distributions with a seeded RNG.
///
/// | draw          | distribution                          |
/// |---------------|---------------------------------------|
/// | inter-arrival | `abs(Normal(mean, std_dev))`          |
/// | processing    | `max(0, Normal(work_mean, std_dev))`  |
/// | repair        | `Exponential(1 / repair_mean)`        |
/// | restock delay | `max(0, Normal(delay_mean, std_dev))` |
/// | breakdown     | `Bernoulli(fail_probability)`         |
/// | faulty        | `Bernoulli(faulty_probability)`       |
#[derive(Debug, Clone)]
pub struct StochasticSampler {
    rng: SimRng,
    arrival: Normal<f64>,
    restock: Normal<f64>,
    stations: Vec<StationDistributions>,
    faulty_probability: f64,
}

impl StochasticSampler {
    pub fn new(config: &FactoryConfig) -> Result<Self, SimError> {
        let arrival = normal("arrivals", config.arrivals.mean, config.arrivals.std_dev)?;
        let restock = normal(
            "stock.delay",
            config.stock.delay_mean,
            config.stock.delay_std_dev,
        )?;

        let stations = config
            .stations
            .iter()
            .enumerate()
            .map(|(index, station)| -> Result<StationDistributions, SimError> {
                let field = format!("stations[{}]", index + 1);
                let processing = normal(
                    &field,
                    station.work_time_mean,
                    config.processing.std_dev,
                )?;
                let repair = Exp::new(1.0 / station.repair_time_mean)
                    .map_err(|err| ConfigError::invalid(&field, err.to_string()))?;
                Ok(StationDistributions {
                    processing,
                    repair,
                    fail_probability: station.fail_probability,
                })
            })
            .collect::<Result<Vec<_>, SimError>>()?;

        Ok(Self {
            rng: SimRng::new(config.run.seed),
            arrival,
            restock,
            stations,
            faulty_probability: config.processing.faulty_probability,
        })
    }

    fn station(&self, station: StationId) -> &StationDistributions {
        &self.stations[station.index()]
    }
}

fn normal(field: &str, mean: f64, std_dev: f64) -> Result<Normal<f64>, ConfigError> {
    Normal::new(mean, std_dev).map_err(|err| ConfigError::invalid(field, err.to_string()))
}

impl Sampler for StochasticSampler {
    fn inter_arrival(&mut self) -> f64 {
        self.rng.sample(&self.arrival).abs()
    }

    fn processing_time(&mut self, station: StationId) -> f64 {
        let distribution = self.station(station).processing;
        self.rng.sample(&distribution).max(0.0)
    }

    fn repair_time(&mut self, station: StationId) -> f64 {
        let distribution = self.station(station).repair;
        self.rng.sample(&distribution)
    }

    fn restock_delay(&mut self, _station: StationId) -> f64 {
        self.rng.sample(&self.restock).max(0.0)
    }

    fn breaks_down(&mut self, station: StationId) -> bool {
        let probability = self.station(station).fail_probability;
        self.rng.next_bool_with_probability(probability)
    }

    fn is_faulty(&mut self, _item: ItemId) -> bool {
        self.rng.next_bool_with_probability(self.faulty_probability)
    }
}

/// Constant timings, for exact-schedule tests and what-if runs.
#[derive(Debug, Clone)]
pub struct FixedSampler {
    pub inter_arrival: f64,
    pub processing: f64,
    pub repair: f64,
    pub restock_delay: f64,
    pub breakdown: bool,
    pub faulty: bool,
    /// Per-station processing times overriding `processing`.
    pub station_processing: BTreeMap<StationId, f64>,
}

impl Default for FixedSampler {
    fn default() -> Self {
        Self {
            inter_arrival: 3.0,
            processing: 4.0,
            repair: 3.0,
            restock_delay: 2.0,
            breakdown: false,
            faulty: false,
            station_processing: BTreeMap::new(),
        }
    }
}

impl FixedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the processing time of one station.
    pub fn with_station_processing(mut self, station: StationId, units: f64) -> Self {
        self.station_processing.insert(station, units);
        self
    }
}

impl Sampler for FixedSampler {
    fn inter_arrival(&mut self) -> f64 {
        self.inter_arrival
    }

    fn processing_time(&mut self, station: StationId) -> f64 {
        self.station_processing
            .get(&station)
            .copied()
            .unwrap_or(self.processing)
    }

    fn repair_time(&mut self, _station: StationId) -> f64 {
        self.repair
    }

    fn restock_delay(&mut self, _station: StationId) -> f64 {
        self.restock_delay
    }

    fn breaks_down(&mut self, _station: StationId) -> bool {
        self.breakdown
    }

    fn is_faulty(&mut self, _item: ItemId) -> bool {
        self.faulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stochastic_draws_stay_in_range() {
        let config = FactoryConfig::default().with_seed(11);
        let mut sampler = StochasticSampler::new(&config).unwrap();
        let station = StationId::new(4);

        for _ in 0..1_000 {
            assert!(sampler.inter_arrival() >= 0.0);
            assert!(sampler.processing_time(station) >= 0.0);
            assert!(sampler.repair_time(station) >= 0.0);
            assert!(sampler.restock_delay(station) >= 0.0);
        }
    }

    #[test]
    fn same_seed_same_draws() {
        let config = FactoryConfig::default().with_seed(5);
        let mut a = StochasticSampler::new(&config).unwrap();
        let mut b = StochasticSampler::new(&config).unwrap();
        let station = StationId::new(1);

        for _ in 0..100 {
            assert_eq!(a.inter_arrival().to_bits(), b.inter_arrival().to_bits());
            assert_eq!(a.breaks_down(station), b.breaks_down(station));
            assert_eq!(
                a.processing_time(station).to_bits(),
                b.processing_time(station).to_bits()
            );
        }
    }

    #[test]
    fn zero_fail_probability_never_breaks() {
        let config = FactoryConfig::reliable();
        let mut sampler = StochasticSampler::new(&config).unwrap();
        for id in 1..=6 {
            for _ in 0..200 {
                assert!(!sampler.breaks_down(StationId::new(id)));
            }
        }
    }

    #[test]
    fn repair_mean_is_roughly_configured() {
        let config = FactoryConfig::default().with_seed(77);
        let mut sampler = StochasticSampler::new(&config).unwrap();
        let station = StationId::new(2);

        let draws = 20_000;
        let total: f64 = (0..draws).map(|_| sampler.repair_time(station)).sum();
        let mean = total / f64::from(draws);
        assert!((mean - 3.0).abs() < 0.2, "mean repair time {mean}");
    }

    #[test]
    fn fixed_sampler_overrides_one_station() {
        let mut sampler = FixedSampler::new().with_station_processing(StationId::new(4), 10.0);
        assert_eq!(sampler.processing_time(StationId::new(4)), 10.0);
        assert_eq!(sampler.processing_time(StationId::new(5)), 4.0);
        assert_eq!(sampler.inter_arrival(), 3.0);
    }
}
