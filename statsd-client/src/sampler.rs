//! Per-call sampling decisions.

use rand::{rngs::OsRng, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Decides whether an event at a given sample rate should be sent.
pub(crate) struct Sampler {
    rng: Xoshiro256StarStar,
}

impl Sampler {
    /// Creates a `Sampler` seeded from the operating system.
    pub fn from_entropy() -> Self {
        let rng = Xoshiro256StarStar::try_from_rng(&mut OsRng)
            .unwrap_or_else(|_| Xoshiro256StarStar::seed_from_u64(rand::random()));
        Sampler { rng }
    }

    /// Creates a `Sampler` with a fixed seed, producing the same sequence of decisions every time.
    pub fn with_seed(seed: u64) -> Self {
        Sampler { rng: Xoshiro256StarStar::seed_from_u64(seed) }
    }

    /// Returns `true` if an event at `sample_rate` should be sent.
    ///
    /// Rates of 1 or more always admit, and rates of zero or less (or NaN) never do.
    pub fn admit(&mut self, sample_rate: f64) -> bool {
        if sample_rate >= 1.0 {
            return true;
        }
        if sample_rate.is_nan() || sample_rate <= 0.0 {
            return false;
        }

        self.rng.random::<f64>() < sample_rate
    }
}
