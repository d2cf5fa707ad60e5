//! Random sources for the filter and the simulated agent
//!
//! All randomness flows through [`NoiseSource`], which the filter owns. Nothing reads global or
//! thread-local RNG state, so a run is fully determined by its seed. Tests that need exact
//! arithmetic swap in [`DeterministicNoise`], which zeroes every Gaussian draw.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Source of the two kinds of random draws a particle filter needs.
pub trait NoiseSource {
    /// Draw from a zero-mean Gaussian with the given standard deviation.
    ///
    /// `std_dev` is finite and non-negative; a zero standard deviation must yield exactly `0.0`.
    fn gaussian(&mut self, std_dev: f64) -> f64;

    /// Draw uniformly from `[0, 1)`.
    fn uniform(&mut self) -> f64;
}

/// Seedable pseudo-random source backed by [`StdRng`].
#[derive(Clone, Debug)]
pub struct RandomNoise {
    rng: StdRng,
}

impl RandomNoise {
    /// Reproducible source: the same seed always produces the same stream.
    pub fn seeded(seed: u64) -> Self {
        RandomNoise {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source seeded from operating system entropy.
    pub fn from_entropy() -> Self {
        RandomNoise {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Default for RandomNoise {
    fn default() -> Self {
        RandomNoise::from_entropy()
    }
}

impl NoiseSource for RandomNoise {
    fn gaussian(&mut self, std_dev: f64) -> f64 {
        if std_dev == 0.0 {
            return 0.0;
        }
        let z: f64 = self.rng.sample(StandardNormal);
        z * std_dev
    }

    fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Noise-free source for exact, repeatable arithmetic in tests.
///
/// Every Gaussian draw is `0.0` and every uniform draw returns the same fixed value.
#[derive(Clone, Copy, Debug)]
pub struct DeterministicNoise {
    uniform: f64,
}

impl DeterministicNoise {
    /// `uniform` is clamped into `[0, 1)`.
    pub fn new(uniform: f64) -> Self {
        let uniform = if uniform.is_finite() {
            uniform.clamp(0.0, 1.0 - f64::EPSILON)
        } else {
            0.0
        };
        DeterministicNoise { uniform }
    }
}

impl Default for DeterministicNoise {
    fn default() -> Self {
        DeterministicNoise::new(0.5)
    }
}

impl NoiseSource for DeterministicNoise {
    fn gaussian(&mut self, _std_dev: f64) -> f64 {
        0.0
    }

    fn uniform(&mut self) -> f64 {
        self.uniform
    }
}

impl<S: NoiseSource + ?Sized> NoiseSource for &mut S {
    fn gaussian(&mut self, std_dev: f64) -> f64 {
        (**self).gaussian(std_dev)
    }

    fn uniform(&mut self) -> f64 {
        (**self).uniform()
    }
}
