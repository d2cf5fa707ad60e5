//! Resampling schemes for the particle population
//!
//! A scheme maps a weight vector to `N` ancestor indices; the filter then copies the chosen
//! positions and resets every weight to `1/N`. Every scheme returns exactly as many indices as
//! there are weights, and never selects a zero-weight particle.
//!
//! - [`ResamplingStrategy::Systematic`] (default): one uniform offset in `[0, 1/N)` and `N`
//!   equally spaced points swept over the cumulative weights in a single `O(N)` pass. Each
//!   particle is copied either `floor(N w)` or `ceil(N w)` times.
//! - [`ResamplingStrategy::Multinomial`]: `N` independent draws, each located by binary search
//!   over the cumulative weights (`O(N log N)`, highest variance).
//! - [`ResamplingStrategy::Residual`]: `floor(N w)` deterministic copies, with the remainder
//!   filled by systematic sampling over the fractional residuals.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::noise::NoiseSource;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    #[default]
    Systematic,
    Multinomial,
    Residual,
}

impl ResamplingStrategy {
    /// Draw `weights.len()` ancestor indices according to this scheme.
    ///
    /// Weights need not be normalized; they are scaled by their sum. A weight vector whose sum is
    /// not positive and finite yields the identity mapping.
    pub fn resample_indices<S: NoiseSource>(
        &self,
        weights: &DVector<f64>,
        noise: &mut S,
    ) -> Vec<usize> {
        let n = weights.len();
        let total = weights.sum();
        if n == 0 || !(total > 0.0 && total.is_finite()) {
            return (0..n).collect();
        }
        match self {
            ResamplingStrategy::Systematic => {
                let u = noise.uniform();
                stratify(weights.as_slice(), total, n, u)
            }
            ResamplingStrategy::Multinomial => multinomial(weights.as_slice(), total, noise),
            ResamplingStrategy::Residual => residual(weights.as_slice(), total, noise),
        }
    }
}

/// Sweep `count` points spaced `total / count` apart, starting at `u * total / count`, over
/// the cumulative weights and return the index whose interval contains each point.
fn stratify(weights: &[f64], total: f64, count: usize, u: f64) -> Vec<usize> {
    let n = weights.len();
    let mut indices = Vec::with_capacity(count);
    if count == 0 {
        return indices;
    }
    let step = total / count as f64;
    let offset = u * step;
    let mut i = 0;
    let mut cumulative = weights[0];
    for k in 0..count {
        let point = offset + k as f64 * step;
        while point >= cumulative && i < n - 1 {
            i += 1;
            cumulative += weights[i];
        }
        indices.push(i);
    }
    indices
}

fn multinomial<S: NoiseSource>(weights: &[f64], total: f64, noise: &mut S) -> Vec<usize> {
    let n = weights.len();
    let mut cdf = Vec::with_capacity(n);
    let mut cumulative = 0.0;
    for &w in weights {
        cumulative += w;
        cdf.push(cumulative);
    }
    (0..n)
        .map(|_| {
            let r = noise.uniform() * total;
            cdf.partition_point(|&c| c <= r).min(n - 1)
        })
        .collect()
}

fn residual<S: NoiseSource>(weights: &[f64], total: f64, noise: &mut S) -> Vec<usize> {
    let n = weights.len();
    let mut indices = Vec::with_capacity(n);
    let mut residuals = Vec::with_capacity(n);
    for (i, &w) in weights.iter().enumerate() {
        let expected = w / total * n as f64;
        let copies = expected.floor() as usize;
        for _ in 0..copies.min(n - indices.len()) {
            indices.push(i);
        }
        residuals.push(expected - copies as f64);
    }
    let remaining = n - indices.len();
    if remaining > 0 {
        let residual_total: f64 = residuals.iter().sum();
        if residual_total > 0.0 && residual_total.is_finite() {
            let u = noise.uniform();
            indices.extend(stratify(&residuals, residual_total, remaining, u));
        } else {
            indices.extend(stratify(weights, total, remaining, noise.uniform()));
        }
    }
    indices
}
