//! Simulated agent, simulation runs and CSV export of their results.
//!
//! This module provides:
//! - [`Robot`], the ground-truth agent that moves on the ring and reports noisy ranges to its
//!   nearest landmark
//! - [`ControlProfile`], the control sequence fed to both the agent and the filter
//! - [`SimulationConfig`], everything needed to reproduce a run, loadable from JSON/YAML/TOML
//! - [`run_simulation`], which drives a [`ParticleFilter`] against a [`Robot`]
//! - [`SimulationResult`], the per-step record of a run with CSV import/export

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::io;
use std::path::Path;

use crate::config::{FilterConfig, read_file, write_file};
use crate::error::FilterError;
use crate::noise::{NoiseSource, RandomNoise};
use crate::particle::ParticleFilter;
use crate::world::{nearest_landmark_distance, torus_distance, wrap};

/// Ground-truth agent on the ring.
///
/// The robot shares the filter's world model (size, landmarks, noise levels) but keeps its own
/// true position, which the filter never sees.
#[derive(Clone, Debug)]
pub struct Robot {
    position: f64,
    world_size: f64,
    landmarks: Vec<f64>,
    process_noise: f64,
    measurement_noise: f64,
    /// True position after construction and after every move
    pub position_history: Vec<f64>,
    /// Every observation returned by [`Robot::observe`]
    pub observation_history: Vec<f64>,
}

impl Robot {
    /// Place a robot at `true_position` (wrapped into the world) in the world described by
    /// `config`.
    pub fn new(true_position: f64, config: &FilterConfig) -> Self {
        let position = wrap(true_position, config.world_size);
        Robot {
            position,
            world_size: config.world_size,
            landmarks: config.landmark_positions.clone(),
            process_noise: config.process_noise,
            measurement_noise: config.measurement_noise,
            position_history: vec![position],
            observation_history: Vec::new(),
        }
    }

    /// Current true position.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Move by `control` plus Gaussian process noise; returns the new position.
    pub fn move_by<S: NoiseSource>(&mut self, control: f64, noise: &mut S) -> f64 {
        let displaced = self.position + control + noise.gaussian(self.process_noise);
        self.position = wrap(displaced, self.world_size);
        self.position_history.push(self.position);
        self.position
    }

    /// Measure the distance to the nearest landmark with Gaussian noise, clamped at zero.
    pub fn observe<S: NoiseSource>(&mut self, noise: &mut S) -> f64 {
        let distance = nearest_landmark_distance(self.position, &self.landmarks, self.world_size);
        let observation = (distance + noise.gaussian(self.measurement_noise)).max(0.0);
        self.observation_history.push(observation);
        observation
    }
}

/// Control input schedule for a simulation run.
///
/// ```
/// use torusloc::sim::ControlProfile;
///
/// let profile = ControlProfile::Accelerating { initial: 0.5, increment: 0.3 };
/// assert!((profile.control_at(2) - 1.1).abs() < 1e-12);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlProfile {
    /// The same displacement every step.
    Constant { displacement: f64 },
    /// Displacement `initial + increment * step`, with `step` counted from zero.
    Accelerating { initial: f64, increment: f64 },
}

impl Default for ControlProfile {
    fn default() -> Self {
        ControlProfile::Constant { displacement: 2.0 }
    }
}

impl ControlProfile {
    /// Control applied at zero-based step `step`.
    pub fn control_at(&self, step: usize) -> f64 {
        match self {
            ControlProfile::Constant { displacement } => *displacement,
            ControlProfile::Accelerating { initial, increment } => {
                initial + increment * step as f64
            }
        }
    }
}

/// Log verbosity, as written in configuration files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Logging preferences carried in a simulation configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Log file path; logs go to stderr when absent.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_seed() -> u64 {
    42
}

/// Complete, reproducible description of a simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Starting true position of the simulated robot.
    pub initial_position: f64,
    /// Number of control/observation steps.
    pub steps: usize,
    /// Seed for both the filter's and the robot's random streams.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Record every particle at every step for later visualization.
    #[serde(default)]
    pub record_particles: bool,
    pub filter: FilterConfig,
    #[serde(default)]
    pub control: ControlProfile,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            filter: FilterConfig {
                num_particles: 1000,
                process_noise: 0.5,
                measurement_noise: 3.0,
                ..FilterConfig::default()
            },
            initial_position: 25.0,
            steps: 50,
            control: ControlProfile::default(),
            seed: default_seed(),
            record_particles: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Write the configuration, choosing the format by file extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_file(self, path.as_ref())
    }

    /// Read a configuration, choosing the format by file extension (.json/.yaml/.yml/.toml).
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_file(path.as_ref())
    }
}

/// One step of a simulation run, as written to CSV.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// One-based step number
    pub step: usize,
    pub control: f64,
    pub observation: f64,
    pub true_position: f64,
    pub estimate: f64,
    /// Shortest distance around the ring between estimate and truth
    pub error: f64,
    pub confidence: f64,
    pub effective_sample_size: f64,
    pub resampled: bool,
}

/// One particle at one step; step `0` is the initial population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleSnapshot {
    pub step: usize,
    pub index: usize,
    pub position: f64,
    pub weight: f64,
}

/// Outcome of a simulation run.
#[derive(Clone, Debug, Default)]
pub struct SimulationResult {
    /// Name or identifier for this run
    pub name: String,
    pub steps: Vec<StepRecord>,
    /// Empty unless particle recording was requested
    pub snapshots: Vec<ParticleSnapshot>,
}

impl SimulationResult {
    /// Creates a new SimulationResult with empty vectors.
    pub fn new(name: &str) -> Self {
        SimulationResult {
            name: name.to_string(),
            steps: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    /// Mean estimation error over all steps, `None` for an empty run.
    pub fn mean_error(&self) -> Option<f64> {
        mean(self.steps.iter().map(|s| s.error))
    }

    /// Mean estimation error over the last `window` steps.
    pub fn recent_mean_error(&self, window: usize) -> Option<f64> {
        let start = self.steps.len().saturating_sub(window);
        mean(self.steps[start..].iter().map(|s| s.error))
    }

    pub fn final_error(&self) -> Option<f64> {
        self.steps.last().map(|s| s.error)
    }

    pub fn resample_count(&self) -> usize {
        self.steps.iter().filter(|s| s.resampled).count()
    }

    /// Write the per-step records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.steps {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the recorded particle snapshots to a CSV file with a header row.
    pub fn snapshots_to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for snapshot in &self.snapshots {
            writer.serialize(snapshot)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read per-step records previously written by [`SimulationResult::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P, name: &str) -> Result<Self, Box<dyn Error>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut result = SimulationResult::new(name);
        for record in reader.deserialize() {
            result.steps.push(record?);
        }
        Ok(result)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn record_snapshot<S: NoiseSource>(
    snapshots: &mut Vec<ParticleSnapshot>,
    step: usize,
    pf: &ParticleFilter<S>,
) {
    snapshots.extend(
        pf.positions()
            .iter()
            .zip(pf.weights())
            .enumerate()
            .map(|(index, (&position, &weight))| ParticleSnapshot {
                step,
                index,
                position,
                weight,
            }),
    );
}

/// Run a particle filter against a simulated robot.
///
/// The filter draws from a stream seeded with `config.seed` and the robot from one seeded with
/// `config.seed + 1`, so the run is fully reproducible.
///
/// # Errors
/// [`FilterError::InvalidConfiguration`] if the filter configuration or the initial position is
/// rejected.
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationResult, FilterError> {
    if !config.initial_position.is_finite() {
        return Err(FilterError::configuration(format!(
            "initial_position must be finite, got {}",
            config.initial_position
        )));
    }
    let mut pf = ParticleFilter::seeded(config.filter.clone(), config.seed)?;
    let mut robot = Robot::new(config.initial_position, &config.filter);
    let mut robot_noise = RandomNoise::seeded(config.seed.wrapping_add(1));
    let world_size = config.filter.world_size;

    let mut result = SimulationResult::new(&format!("seed_{}", config.seed));
    if config.record_particles {
        record_snapshot(&mut result.snapshots, 0, &pf);
    }
    info!(
        "Simulating {} steps with {} particles from true position {:.2}",
        config.steps,
        config.filter.num_particles,
        robot.position()
    );

    for k in 0..config.steps {
        let control = config.control.control_at(k);
        robot.move_by(control, &mut robot_noise);
        let observation = robot.observe(&mut robot_noise);
        let resampled = pf.filter_step(control, observation)?;

        let estimate = pf.estimate_position();
        let error = torus_distance(estimate, robot.position(), world_size);
        let record = StepRecord {
            step: k + 1,
            control,
            observation,
            true_position: robot.position(),
            estimate,
            error,
            confidence: pf.get_confidence(),
            effective_sample_size: pf.effective_sample_size(),
            resampled,
        };
        debug!(
            "Step {}: true={:.2}, estimate={:.2}, error={:.2}, confidence={:.4}",
            record.step, record.true_position, record.estimate, record.error, record.confidence
        );
        result.steps.push(record);
        if config.record_particles {
            record_snapshot(&mut result.snapshots, k + 1, &pf);
        }
    }
    Ok(result)
}
