//! Deterministic random number generator.
//!
//! Every random draw in a run goes through one seeded `SimRng`, in the order
//! the scheduler resumes tasks. Same seed, same draws, same run.

use rand::rngs::SmallRng;
use rand::{Rng as _, SeedableRng};
use rand_distr::Distribution;

/// Seeded, reproducible RNG.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: SmallRng,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in `[0.0, 1.0)`.
    pub fn next_f64(&mut self) -> f64 {
        self.inner.r#gen()
    }

    /// Bernoulli trial: `true` with the given probability.
    #[inline]
    pub fn next_bool_with_probability(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Draws one sample from a distribution.
    pub fn sample<D: Distribution<f64>>(&mut self, distribution: &D) -> f64 {
        distribution.sample(&mut self.inner)
    }
}
