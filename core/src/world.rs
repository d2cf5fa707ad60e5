//! Toroidal world geometry and circular statistics
//!
//! The agent lives on a one-dimensional ring of circumference `world_size`: position `0` and
//! position `world_size` are the same point. Every quantity the filter derives from a position
//! (distances to landmarks, the estimate, its spread) has to respect that identification, so the
//! helpers for doing so live here rather than being scattered through the filter.
//!
//! # Wrapping
//! Positions are reduced with a true (Euclidean) modulo so that negative displacements wrap
//! from the low end of the domain to the high end, e.g. `wrap(-1.0, 200.0) == 199.0`. Truncating
//! remainder (`%`) would leave such a position negative.
//!
//! # Distances
//! The distance between two points on the ring is the shorter of the two arcs between them:
//!
//! $$
//! d(a, b) = \min(|a - b| \bmod L,\; L - |a - b| \bmod L)
//! $$
//!
//! # Circular statistics
//! A linear weighted mean is wrong at the seam of the domain: hypotheses at `1` and `199` on a
//! world of size `200` average to `100`, the point farthest from both. Instead each position is
//! mapped to an angle $\theta = 2\pi x / L$ and the weighted mean of the unit vectors
//! $(\cos\theta, \sin\theta)$ is taken. Its direction gives the circular mean and its length
//! $R \in [0, 1]$ measures concentration.
use nalgebra::DVector;
use std::f64::consts::TAU;

/// Wrap a position into `[0, world_size)`.
///
/// `world_size` must be positive. The result is strictly below `world_size` even when the
/// Euclidean remainder rounds up to it for tiny negative inputs.
///
/// ```
/// use torusloc::world::wrap;
/// assert_eq!(wrap(204.0, 200.0), 4.0);
/// assert_eq!(wrap(-1.0, 200.0), 199.0);
/// ```
pub fn wrap(position: f64, world_size: f64) -> f64 {
    let wrapped = position.rem_euclid(world_size);
    if wrapped >= world_size { 0.0 } else { wrapped }
}

/// Signed shortest displacement that takes `from` to `to`, in `[-world_size / 2, world_size / 2)`.
pub fn signed_offset(from: f64, to: f64, world_size: f64) -> f64 {
    let forward = wrap(to - from, world_size);
    if forward >= world_size / 2.0 {
        forward - world_size
    } else {
        forward
    }
}

/// Shortest arc length between two points on the ring.
pub fn torus_distance(a: f64, b: f64, world_size: f64) -> f64 {
    let d = (a - b).abs().rem_euclid(world_size);
    d.min(world_size - d)
}

/// Distance from `position` to the closest landmark, measured around the ring.
///
/// Returns `f64::INFINITY` for an empty landmark list; configurations with no landmarks are
/// rejected before a filter is built, so the filter never sees that value.
pub fn nearest_landmark_distance(position: f64, landmarks: &[f64], world_size: f64) -> f64 {
    landmarks
        .iter()
        .map(|&landmark| torus_distance(position, landmark, world_size))
        .fold(f64::INFINITY, f64::min)
}

/// Map a position on the ring to an angle in radians.
pub fn to_angle(position: f64, world_size: f64) -> f64 {
    TAU * position / world_size
}

/// Map an angle in radians back onto the ring, in `[0, world_size)`.
pub fn from_angle(angle: f64, world_size: f64) -> f64 {
    wrap(angle * world_size / TAU, world_size)
}

/// Weighted first trigonometric moment of a set of positions on the ring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircularMoments {
    /// Weighted mean of `cos(theta)`
    pub mean_cos: f64,
    /// Weighted mean of `sin(theta)`
    pub mean_sin: f64,
    world_size: f64,
}

impl CircularMoments {
    /// Compute the moments of `positions` under `weights`.
    ///
    /// Weights are used as given; callers pass a normalized weight vector. Both vectors must have
    /// the same length.
    pub fn weighted(positions: &DVector<f64>, weights: &DVector<f64>, world_size: f64) -> Self {
        let cosines = positions.map(|x| to_angle(x, world_size).cos());
        let sines = positions.map(|x| to_angle(x, world_size).sin());
        CircularMoments {
            mean_cos: cosines.dot(weights),
            mean_sin: sines.dot(weights),
            world_size,
        }
    }

    /// Circular mean mapped back onto the ring.
    ///
    /// A zero resultant (perfectly balanced population) yields `0.0` since `atan2(0, 0) == 0`.
    pub fn mean_position(&self) -> f64 {
        from_angle(self.mean_sin.atan2(self.mean_cos), self.world_size)
    }

    /// Mean resultant length `R`, clamped into `[0, 1]` against rounding.
    pub fn resultant_length(&self) -> f64 {
        self.mean_cos.hypot(self.mean_sin).clamp(0.0, 1.0)
    }

    /// Circular standard deviation `sqrt(-2 ln R)` expressed in world units.
    ///
    /// `R` is clamped to `f64::MIN_POSITIVE` so a fully dispersed population gives a large but
    /// finite value.
    pub fn circular_std(&self) -> f64 {
        let r = self.resultant_length().max(f64::MIN_POSITIVE);
        (-2.0 * r.ln()).max(0.0).sqrt() * self.world_size / TAU
    }
}
