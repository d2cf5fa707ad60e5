//! Monte Carlo localization on a one-dimensional toroidal world
//!
//! This crate estimates the position of an agent that moves around a ring of fixed circumference,
//! using only noisy control inputs (intended displacements) and noisy range measurements to the
//! nearest of a set of fixed landmarks. The estimator is a bootstrap particle filter: a population
//! of weighted position hypotheses that is predicted with the control, corrected with the range
//! observation, and resampled when its weights degenerate.
//!
//! # Crate layout
//!
//! - [`world`]: wrap-around arithmetic, ring distances and circular statistics.
//! - [`config`]: the immutable [`FilterConfig`] and its JSON/YAML/TOML persistence.
//! - [`noise`]: the [`NoiseSource`] seam through which all randomness flows.
//! - [`resampling`]: systematic, multinomial and residual resampling.
//! - [`particle`]: the population ([`FilterState`]) and the engine ([`ParticleFilter`]).
//! - [`sim`]: a ground-truth robot and a reproducible simulation driver with CSV output.
//!
//! # Model
//!
//! Positions live in $[0, L)$ where $L$ is the world size. Each step:
//!
//! $$
//! x_i \leftarrow (x_i + u + \epsilon_i) \bmod L, \quad \epsilon_i \sim \mathcal{N}(0, \sigma_p^2)
//! $$
//!
//! $$
//! w_i \leftarrow w_i \exp\left(-\frac{(z - \hat z(x_i))^2}{2\sigma_m^2}\right), \quad
//! \hat z(x) = \min_j d_L(x, \ell_j)
//! $$
//!
//! followed by normalization and, when $1/\sum w_i^2 < \tau N$, systematic resampling. The
//! likelihood only uses the nearest landmark, so the observation carries no information about
//! which landmark is being ranged.
//!
//! # Example
//!
//! ```rust
//! use torusloc::{FilterConfig, ParticleFilter};
//!
//! let config = FilterConfig {
//!     world_size: 100.0,
//!     num_particles: 1000,
//!     process_noise: 0.5,
//!     measurement_noise: 2.0,
//!     landmark_positions: vec![50.0],
//!     resample_threshold: 0.5,
//!     ..FilterConfig::default()
//! };
//! let mut pf = ParticleFilter::seeded(config, 7).unwrap();
//! for _ in 0..30 {
//!     pf.filter_step(0.0, 0.0).unwrap();
//! }
//! assert!((pf.estimate_position() - 50.0).abs() < 2.0);
//! ```

pub mod config;
pub mod error;
pub mod noise;
pub mod particle;
pub mod resampling;
pub mod sim;
pub mod world;

pub use config::FilterConfig;
pub use error::FilterError;
pub use noise::{DeterministicNoise, NoiseSource, RandomNoise};
pub use particle::{FilterState, ParticleFilter, WeightUpdate};
pub use resampling::ResamplingStrategy;
