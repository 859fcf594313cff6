//! Random number generation for reproducible swarm runs.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator for reproducible simulations.
///
/// Uses ChaCha8 algorithm for fast, high-quality pseudorandom numbers
/// with deterministic seed-based generation. A swarm owns exactly one of
/// these and every random decision of a run draws from it.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates a raw 64-bit value.
    pub fn random_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Generates random number in range [0, 1].
    pub fn random_f64(&mut self) -> f64 {
        self.rng.next_u64() as f64 / u64::MAX as f64
    }

    /// Generates random number in range [min, max).
    pub fn random_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.rng.next_u64() % (max - min))
    }

    /// Generates a random index in [0, len). Returns 0 for empty ranges.
    pub fn random_index(&mut self, len: usize) -> usize {
        self.random_range(0, len as u64) as usize
    }

    /// Samples `mean + N(0,1) * sqrt(spread)`, truncated toward zero.
    ///
    /// Negative samples are floored at zero; a zero spread returns `mean`
    /// without consuming randomness.
    pub fn random_gaussian(&mut self, mean: u32, spread: u32) -> u32 {
        if spread == 0 {
            return mean;
        }

        // Box-Muller; u1 must stay away from zero for the logarithm
        let u1 = (1.0 - self.random_f64()).max(f64::MIN_POSITIVE);
        let u2 = self.random_f64();
        let standard = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();

        let sample = f64::from(mean) + standard * f64::from(spread).sqrt();
        if sample <= 0.0 { 0 } else { sample as u32 }
    }

    /// Shuffles a mutable slice in-place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        use rand::seq::SliceRandom;
        slice.shuffle(&mut self.rng);
    }

    /// Selects random element from slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let index = self.random_index(slice.len());
            Some(&slice[index])
        }
    }
}
