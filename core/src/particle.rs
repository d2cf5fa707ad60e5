//! Sequential Monte Carlo localization on a toroidal world
//!
//! [`ParticleFilter`] approximates the posterior over the agent's position with `N` weighted
//! hypotheses held in a [`FilterState`]. Each step runs, in this order:
//!
//! 1. [`ParticleFilter::predict`]: shift every particle by the control plus Gaussian process
//!    noise and wrap it back into `[0, world_size)`.
//! 2. [`ParticleFilter::update`]: multiply every weight by the Gaussian likelihood of the range
//!    observation given the particle's distance to its nearest landmark, then normalize.
//! 3. [`ParticleFilter::resample`]: if the effective sample size
//!    $N_{eff} = 1 / \sum w_i^2$ has fallen below `resample_threshold * N`, redraw the
//!    population (systematic resampling by default) and reset weights to `1/N`.
//!
//! Resampling before the update would discard the discriminating power of the incoming
//! observation; predicting after it would move particles away from the positions their weights
//! were computed for. [`ParticleFilter::filter_step`] fixes that order.
//!
//! The position estimate and its confidence come from circular statistics (see
//! [`crate::world::CircularMoments`]) so that a population straddling the seam of the world is
//! summarised correctly.
//!
//! # Usage
//!
//! ```rust
//! use torusloc::config::FilterConfig;
//! use torusloc::particle::ParticleFilter;
//!
//! let config = FilterConfig {
//!     num_particles: 500,
//!     landmark_positions: vec![50.0],
//!     ..FilterConfig::default()
//! };
//! let mut pf = ParticleFilter::seeded(config, 42).unwrap();
//! let resampled = pf.filter_step(0.0, 0.0).unwrap();
//! let estimate = pf.estimate_position();
//! assert!((0.0..100.0).contains(&estimate));
//! # let _ = resampled;
//! ```

use log::{debug, trace, warn};
use nalgebra::DVector;
use rayon::prelude::*;
use std::fmt::{self, Debug};

use crate::config::FilterConfig;
use crate::error::FilterError;
use crate::noise::{NoiseSource, RandomNoise};
use crate::world::{CircularMoments, nearest_landmark_distance, wrap};

/// The particle population: positions and their normalized weights.
///
/// Both vectors always have length `N`. Positions always lie in `[0, world_size)` and weights
/// always sum to one between public calls on the owning filter.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterState {
    positions: DVector<f64>,
    weights: DVector<f64>,
}

impl FilterState {
    fn with_uniform_weights(positions: DVector<f64>) -> Self {
        let n = positions.len();
        FilterState {
            positions,
            weights: DVector::from_element(n, 1.0 / n as f64),
        }
    }

    /// Particle positions.
    pub fn positions(&self) -> &DVector<f64> {
        &self.positions
    }

    /// Normalized particle weights.
    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    /// Population size `N`.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn reset_weights(&mut self) {
        let uniform = 1.0 / self.len() as f64;
        self.weights.fill(uniform);
    }
}

/// Result of folding an observation into the weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightUpdate {
    /// Weights were multiplied by their likelihoods and renormalized.
    Normalized,
    /// Every likelihood underflowed (or the sum was non-finite); weights were reset to `1/N`.
    DegenerateReset,
}

/// Bootstrap particle filter for a single agent on a ring with fixed landmarks.
///
/// The filter owns its configuration, its population and its random source. It performs no
/// internal locking; a single caller drives it step by step.
#[derive(Clone)]
pub struct ParticleFilter<S: NoiseSource = RandomNoise> {
    config: FilterConfig,
    state: FilterState,
    noise: S,
}

impl ParticleFilter<RandomNoise> {
    /// Build a filter whose randomness is fully determined by `seed`.
    pub fn seeded(config: FilterConfig, seed: u64) -> Result<Self, FilterError> {
        ParticleFilter::new(config, RandomNoise::seeded(seed))
    }
}

impl<S: NoiseSource> ParticleFilter<S> {
    /// Validate `config` and spread `N` particles uniformly over the world with weights `1/N`.
    ///
    /// # Errors
    /// [`FilterError::InvalidConfiguration`] if the configuration is rejected; no filter is built.
    pub fn new(config: FilterConfig, mut noise: S) -> Result<Self, FilterError> {
        config.validate()?;
        let world_size = config.world_size;
        let positions = DVector::from_fn(config.num_particles, |_, _| {
            wrap(noise.uniform() * world_size, world_size)
        });
        debug!(
            "Initialized {} particles uniformly over [0, {})",
            config.num_particles, world_size
        );
        Ok(ParticleFilter {
            config,
            state: FilterState::with_uniform_weights(positions),
            noise,
        })
    }

    /// Build a filter from caller-supplied hypotheses, each given weight `1/N`.
    ///
    /// Positions are wrapped into the world.
    ///
    /// # Errors
    /// [`FilterError::InvalidConfiguration`] if the configuration is rejected or the number of
    /// positions differs from `num_particles`; [`FilterError::InvalidInput`] if any position is
    /// not finite.
    pub fn from_positions(
        config: FilterConfig,
        positions: &[f64],
        noise: S,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        if positions.len() != config.num_particles {
            return Err(FilterError::configuration(format!(
                "expected {} initial positions, got {}",
                config.num_particles,
                positions.len()
            )));
        }
        if let Some(bad) = positions.iter().find(|p| !p.is_finite()) {
            return Err(FilterError::input(format!(
                "initial positions must be finite, got {}",
                bad
            )));
        }
        let world_size = config.world_size;
        let positions = DVector::from_iterator(
            positions.len(),
            positions.iter().map(|&p| wrap(p, world_size)),
        );
        Ok(ParticleFilter {
            config,
            state: FilterState::with_uniform_weights(positions),
            noise,
        })
    }

    /// Move every particle by `control` plus independent Gaussian process noise.
    ///
    /// Weights are untouched.
    ///
    /// # Errors
    /// [`FilterError::InvalidInput`] if `control` is not finite or a moved particle would not be;
    /// the population is left unchanged.
    pub fn predict(&mut self, control: f64) -> Result<(), FilterError> {
        check_finite("control", control)?;
        let world_size = self.config.world_size;
        let process_noise = self.config.process_noise;
        let noise = &mut self.noise;
        let moved = self
            .state
            .positions
            .map(|x| x + control + noise.gaussian(process_noise));
        if let Some(bad) = moved.iter().find(|x| !x.is_finite()) {
            return Err(FilterError::input(format!(
                "control {} produced a non-finite position {}",
                control, bad
            )));
        }
        self.state.positions = moved;
        self.state
            .positions
            .as_mut_slice()
            .par_iter_mut()
            .for_each(|x| *x = wrap(*x, world_size));
        Ok(())
    }

    /// Weight every particle by the likelihood of `observation`, the measured distance to the
    /// nearest landmark, and renormalize.
    ///
    /// If every likelihood underflows to zero the weights are reset to uniform rather than
    /// divided by zero; the returned [`WeightUpdate`] says which path was taken.
    ///
    /// # Errors
    /// [`FilterError::InvalidInput`] if `observation` is not finite; weights are left unchanged.
    pub fn update(&mut self, observation: f64) -> Result<WeightUpdate, FilterError> {
        check_finite("observation", observation)?;
        let likelihoods = self.likelihoods(observation);
        let mut weights = self.state.weights.component_mul(&likelihoods);
        let total = weights.iter().sum::<f64>();
        if total > 0.0 && total.is_finite() {
            weights /= total;
            self.state.weights = weights;
            trace!(
                "Observation {:.3} absorbed, effective sample size {:.1}",
                observation,
                self.effective_sample_size()
            );
            Ok(WeightUpdate::Normalized)
        } else {
            warn!(
                "Observation {:.3} is implausible for every particle (weight sum {}); resetting weights to uniform",
                observation, total
            );
            self.state.reset_weights();
            Ok(WeightUpdate::DegenerateReset)
        }
    }

    /// Unnormalized Gaussian likelihood of `observation` for every particle.
    fn likelihoods(&self, observation: f64) -> DVector<f64> {
        let world_size = self.config.world_size;
        let landmarks = self.config.landmark_positions.as_slice();
        let two_var = 2.0 * self.config.measurement_noise * self.config.measurement_noise;
        let values: Vec<f64> = self
            .state
            .positions
            .as_slice()
            .par_iter()
            .map(|&x| {
                let expected = nearest_landmark_distance(x, landmarks, world_size);
                let residual = observation - expected;
                (-(residual * residual) / two_var).exp()
            })
            .collect();
        DVector::from_vec(values)
    }

    /// Effective sample size $1 / \sum w_i^2$, between `1` and `N` for normalized weights.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_of_squares = self.state.weights.dot(&self.state.weights);
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }

    /// Whether the effective sample size is below `resample_threshold * N`.
    pub fn needs_resampling(&self) -> bool {
        self.effective_sample_size()
            < self.config.resample_threshold * self.config.num_particles as f64
    }

    /// Resample if the population has degenerated; returns whether it did.
    pub fn resample(&mut self) -> bool {
        let ess = self.effective_sample_size();
        if self.needs_resampling() {
            debug!(
                "Effective sample size {:.1} below threshold {:.1}, resampling",
                ess,
                self.config.resample_threshold * self.config.num_particles as f64
            );
            self.force_resample();
            true
        } else {
            debug!("Effective sample size {:.1}, keeping population", ess);
            false
        }
    }

    /// Redraw the population with the configured scheme, regardless of the effective sample
    /// size, and reset all weights to `1/N`.
    pub fn force_resample(&mut self) {
        let indices = self
            .config
            .resampling
            .resample_indices(&self.state.weights, &mut self.noise);
        let positions = &self.state.positions;
        let resampled = DVector::from_iterator(indices.len(), indices.iter().map(|&i| positions[i]));
        self.state = FilterState::with_uniform_weights(resampled);
    }

    /// Predict with `control`, update with `observation`, then resample if needed.
    ///
    /// Returns whether a resample occurred.
    ///
    /// # Errors
    /// [`FilterError::InvalidInput`] if either value is not finite. Both are checked before
    /// anything is mutated, so a rejected step leaves the filter as it was.
    pub fn filter_step(&mut self, control: f64, observation: f64) -> Result<bool, FilterError> {
        check_finite("control", control)?;
        check_finite("observation", observation)?;
        self.predict(control)?;
        self.update(observation)?;
        Ok(self.resample())
    }

    fn moments(&self) -> CircularMoments {
        CircularMoments::weighted(
            &self.state.positions,
            &self.state.weights,
            self.config.world_size,
        )
    }

    /// Weighted circular mean of the particle positions, in `[0, world_size)`.
    pub fn estimate_position(&self) -> f64 {
        self.moments().mean_position()
    }

    /// Concentration of the population: the weighted mean resultant length in `[0, 1]`.
    ///
    /// `1` when all particles coincide, close to `0` when they are spread evenly around the ring.
    pub fn get_confidence(&self) -> f64 {
        self.moments().resultant_length()
    }

    /// Circular standard deviation of the population in world units.
    pub fn circular_std(&self) -> f64 {
        self.moments().circular_std()
    }

    /// Position of the single most heavily weighted particle.
    pub fn highest_weight_position(&self) -> f64 {
        self.state.positions[self.state.weights.imax()]
    }

    pub fn positions(&self) -> &[f64] {
        self.state.positions.as_slice()
    }

    pub fn weights(&self) -> &[f64] {
        self.state.weights.as_slice()
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

fn check_finite(name: &str, value: f64) -> Result<(), FilterError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FilterError::input(format!("{} must be finite, got {}", name, value)))
    }
}

impl<S: NoiseSource> Debug for ParticleFilter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self.state.weights.min();
        let max_weight = self.state.weights.max();
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.state.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field(
                "estimate",
                &format_args!("{:.3} / {}", self.estimate_position(), self.config.world_size),
            )
            .field("confidence", &format_args!("{:.4}", self.get_confidence()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::DeterministicNoise;
    use crate::resampling::ResamplingStrategy;
    use crate::world::torus_distance;
    use assert_approx_eq::assert_approx_eq;

    fn config(world_size: f64, num_particles: usize) -> FilterConfig {
        FilterConfig {
            world_size,
            num_particles,
            process_noise: 0.0,
            measurement_noise: 1.0,
            landmark_positions: vec![50.0],
            resample_threshold: 0.5,
            resampling: ResamplingStrategy::Systematic,
        }
    }

    fn weight_sum(pf: &ParticleFilter<impl NoiseSource>) -> f64 {
        pf.weights().iter().sum()
    }

    #[test]
    fn test_new_spreads_particles_uniformly() {
        let pf = ParticleFilter::seeded(config(200.0, 2000), 1).unwrap();
        assert_eq!(pf.positions().len(), 2000);
        assert_eq!(pf.weights().len(), 2000);
        assert!(pf.positions().iter().all(|x| (0.0..200.0).contains(x)));
        assert!(pf.weights().iter().all(|&w| w == 1.0 / 2000.0));
        let below_half = pf.positions().iter().filter(|&&x| x < 100.0).count();
        assert!((800..1200).contains(&below_half), "{below_half}");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = ParticleFilter::seeded(config(200.0, 0), 1).unwrap_err();
        assert!(matches!(err, FilterError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_from_positions_wraps_and_checks_length() {
        let pf = ParticleFilter::from_positions(
            config(200.0, 3),
            &[-1.0, 250.0, 10.0],
            DeterministicNoise::default(),
        )
        .unwrap();
        assert_eq!(pf.positions(), &[199.0, 50.0, 10.0]);

        let err = ParticleFilter::from_positions(
            config(200.0, 3),
            &[1.0, 2.0],
            DeterministicNoise::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidConfiguration { .. }));

        let err = ParticleFilter::from_positions(
            config(200.0, 2),
            &[1.0, f64::NAN],
            DeterministicNoise::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidInput { .. }));
    }

    #[test]
    fn test_predict_wraps_past_the_seam() {
        let mut pf =
            ParticleFilter::from_positions(config(200.0, 1), &[199.0], DeterministicNoise::default())
                .unwrap();
        pf.predict(5.0).unwrap();
        assert_approx_eq!(pf.positions()[0], 4.0, 1e-12);
        pf.predict(-10.0).unwrap();
        assert_approx_eq!(pf.positions()[0], 194.0, 1e-12);
    }

    #[test]
    fn test_predict_leaves_weights_alone() {
        let mut pf = ParticleFilter::seeded(config(100.0, 50), 3).unwrap();
        pf.update(10.0).unwrap();
        let before = pf.weights().to_vec();
        pf.predict(3.0).unwrap();
        assert_eq!(pf.weights(), before.as_slice());
    }

    #[test]
    fn test_predict_rejects_non_finite_control() {
        let mut pf = ParticleFilter::seeded(config(100.0, 20), 3).unwrap();
        let before = pf.state().clone();
        for control in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = pf.predict(control).unwrap_err();
            assert!(matches!(err, FilterError::InvalidInput { .. }));
        }
        assert_eq!(pf.state(), &before);
    }

    #[test]
    fn test_update_favours_consistent_particles() {
        // landmark at 50: a particle at 47 expects 3, one at 10 expects 40
        let mut pf = ParticleFilter::from_positions(
            config(100.0, 2),
            &[47.0, 10.0],
            DeterministicNoise::default(),
        )
        .unwrap();
        let outcome = pf.update(3.0).unwrap();
        assert_eq!(outcome, WeightUpdate::Normalized);
        assert!(pf.weights()[0] > 0.999);
        assert_approx_eq!(weight_sum(&pf), 1.0, 1e-12);
    }

    #[test]
    fn test_update_uses_gaussian_kernel() {
        // expected distances 1 and 2 against observation 0 with unit noise
        let mut pf = ParticleFilter::from_positions(
            config(100.0, 2),
            &[49.0, 52.0],
            DeterministicNoise::default(),
        )
        .unwrap();
        pf.update(0.0).unwrap();
        let l1 = (-0.5f64).exp();
        let l2 = (-2.0f64).exp();
        assert_approx_eq!(pf.weights()[0], l1 / (l1 + l2), 1e-12);
        assert_approx_eq!(pf.weights()[1], l2 / (l1 + l2), 1e-12);
    }

    #[test]
    fn test_update_degenerate_resets_uniform() {
        let mut pf = ParticleFilter::seeded(config(100.0, 100), 9).unwrap();
        let outcome = pf.update(1e6).unwrap();
        assert_eq!(outcome, WeightUpdate::DegenerateReset);
        assert!(pf.weights().iter().all(|w| !w.is_nan()));
        assert!(pf.weights().iter().all(|&w| w == 1.0 / 100.0));
        assert_approx_eq!(weight_sum(&pf), 1.0, 1e-9);
    }

    #[test]
    fn test_update_rejects_non_finite_observation() {
        let mut pf = ParticleFilter::seeded(config(100.0, 20), 3).unwrap();
        pf.update(4.0).unwrap();
        let before = pf.state().clone();
        let err = pf.update(f64::NAN).unwrap_err();
        assert!(matches!(err, FilterError::InvalidInput { .. }));
        assert_eq!(pf.state(), &before);
    }

    #[test]
    fn test_effective_sample_size_bounds() {
        let mut pf = ParticleFilter::from_positions(
            config(100.0, 4),
            &[50.0, 10.0, 20.0, 30.0],
            DeterministicNoise::default(),
        )
        .unwrap();
        assert_approx_eq!(pf.effective_sample_size(), 4.0, 1e-12);
        pf.update(0.0).unwrap();
        assert!(pf.effective_sample_size() < 1.0 + 1e-9);
        assert!(pf.needs_resampling());
    }

    #[test]
    fn test_resample_is_adaptive() {
        let mut pf = ParticleFilter::seeded(config(100.0, 100), 5).unwrap();
        assert!(!pf.resample(), "uniform weights must not trigger a resample");
        pf.update(0.0).unwrap();
        assert!(pf.resample());
        assert!(pf.weights().iter().all(|&w| w == 1.0 / 100.0));
    }

    #[test]
    fn test_force_resample_copies_heavy_particles() {
        let mut pf = ParticleFilter::from_positions(
            config(100.0, 4),
            &[50.0, 10.0, 20.0, 30.0],
            DeterministicNoise::default(),
        )
        .unwrap();
        pf.update(0.0).unwrap();
        pf.force_resample();
        assert_eq!(pf.positions(), &[50.0, 50.0, 50.0, 50.0]);
        assert_eq!(pf.weights(), &[0.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_filter_step_rejects_before_mutating() {
        let mut pf = ParticleFilter::seeded(config(100.0, 30), 8).unwrap();
        let before = pf.state().clone();
        let err = pf.filter_step(1.0, f64::INFINITY).unwrap_err();
        assert!(matches!(err, FilterError::InvalidInput { .. }));
        assert_eq!(pf.state(), &before);
    }

    #[test]
    fn test_estimate_across_seam() {
        let pf = ParticleFilter::from_positions(
            config(200.0, 2),
            &[1.0, 199.0],
            DeterministicNoise::default(),
        )
        .unwrap();
        let estimate = pf.estimate_position();
        assert!(torus_distance(estimate, 0.0, 200.0) < 1e-6, "{estimate}");
        assert!((0.0..200.0).contains(&estimate));
    }

    #[test]
    fn test_confidence_of_coincident_particles() {
        let pf = ParticleFilter::from_positions(
            config(100.0, 5),
            &[30.0; 5],
            DeterministicNoise::default(),
        )
        .unwrap();
        assert_approx_eq!(pf.get_confidence(), 1.0, 1e-12);
        assert!(pf.circular_std().is_finite());
        assert_approx_eq!(pf.highest_weight_position(), 30.0, 1e-12);
    }

    #[test]
    fn test_confidence_low_for_even_spread() {
        let positions: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let pf = ParticleFilter::from_positions(
            config(100.0, 100),
            &positions,
            DeterministicNoise::default(),
        )
        .unwrap();
        assert!(pf.get_confidence() < 1e-9);
    }

    #[test]
    fn test_debug_summary() {
        let pf = ParticleFilter::seeded(config(100.0, 10), 2).unwrap();
        let text = format!("{:?}", pf);
        assert!(text.contains("num_particles: 10"));
        assert!(text.contains("effective_particles"));
    }
}
