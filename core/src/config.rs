//! Filter configuration and its on-disk formats
//!
//! A [`FilterConfig`] is built once, validated once, and then held unchanged by the filter for
//! its whole lifetime. Changing the population size or the world size requires building a new
//! filter. Configurations can be stored as JSON, YAML or TOML; the format is picked from the
//! file extension.
//!
//! ```
//! use torusloc::config::FilterConfig;
//!
//! let config = FilterConfig {
//!     world_size: 200.0,
//!     landmark_positions: vec![50.0, 150.0],
//!     ..FilterConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::FilterError;
use crate::resampling::ResamplingStrategy;

/// Immutable parameters of a localization filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Circumference of the toroidal world; positions live in `[0, world_size)`.
    pub world_size: f64,
    /// Population size `N`, fixed for the filter's lifetime.
    pub num_particles: usize,
    /// Standard deviation of the additive Gaussian motion noise.
    pub process_noise: f64,
    /// Standard deviation of the Gaussian range likelihood.
    pub measurement_noise: f64,
    /// Fixed landmark coordinates on the ring.
    pub landmark_positions: Vec<f64>,
    /// Resample when the effective sample size drops below this fraction of `N`.
    pub resample_threshold: f64,
    /// Scheme used when a resample is triggered.
    #[serde(default)]
    pub resampling: ResamplingStrategy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            world_size: 100.0,
            num_particles: 1000,
            process_noise: 1.0,
            measurement_noise: 5.0,
            landmark_positions: vec![20.0, 40.0, 60.0, 80.0],
            resample_threshold: 0.5,
            resampling: ResamplingStrategy::default(),
        }
    }
}

impl FilterConfig {
    /// Check that the configuration describes a usable filter.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidConfiguration`] naming the first offending field.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.num_particles < 1 {
            return Err(FilterError::configuration(
                "num_particles must be at least 1",
            ));
        }
        if !(self.world_size > 0.0 && self.world_size.is_finite()) {
            return Err(FilterError::configuration(format!(
                "world_size must be positive and finite, got {}",
                self.world_size
            )));
        }
        if !(self.measurement_noise > 0.0 && self.measurement_noise.is_finite()) {
            return Err(FilterError::configuration(format!(
                "measurement_noise must be positive and finite, got {}",
                self.measurement_noise
            )));
        }
        if !(self.process_noise >= 0.0 && self.process_noise.is_finite()) {
            return Err(FilterError::configuration(format!(
                "process_noise must be non-negative and finite, got {}",
                self.process_noise
            )));
        }
        if self.landmark_positions.is_empty() {
            return Err(FilterError::configuration(
                "landmark_positions must not be empty",
            ));
        }
        if let Some(bad) = self.landmark_positions.iter().find(|l| !l.is_finite()) {
            return Err(FilterError::configuration(format!(
                "landmark positions must be finite, got {}",
                bad
            )));
        }
        if !(self.resample_threshold > 0.0 && self.resample_threshold <= 1.0) {
            return Err(FilterError::configuration(format!(
                "resample_threshold must be in (0, 1], got {}",
                self.resample_threshold
            )));
        }
        Ok(())
    }

    /// Write the configuration, choosing the format by file extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_file(self, path.as_ref())
    }

    /// Read a configuration, choosing the format by file extension (.json/.yaml/.yml/.toml).
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_file(path.as_ref())
    }
}

/// Serialization formats recognised by the `to_file`/`from_file` helpers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FileFormat {
    Json,
    Yaml,
    Toml,
}

pub(crate) fn file_format(path: &Path) -> io::Result<FileFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("json") => Ok(FileFormat::Json),
        Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
        Some("toml") => Ok(FileFormat::Toml),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "unsupported file extension",
        )),
    }
}

/// Serialize `value` to `path` in the format implied by its extension.
pub(crate) fn write_file<T: Serialize>(value: &T, path: &Path) -> io::Result<()> {
    let format = file_format(path)?;
    let mut file = File::create(path)?;
    match format {
        FileFormat::Json => serde_json::to_writer_pretty(file, value).map_err(io::Error::other),
        FileFormat::Yaml => {
            let s = serde_yaml::to_string(value).map_err(io::Error::other)?;
            file.write_all(s.as_bytes())
        }
        FileFormat::Toml => {
            let s = toml::to_string(value).map_err(io::Error::other)?;
            file.write_all(s.as_bytes())
        }
    }
}

/// Deserialize a value from `path` in the format implied by its extension.
pub(crate) fn read_file<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let format = file_format(path)?;
    let mut file = File::open(path)?;
    match format {
        FileFormat::Json => serde_json::from_reader(file).map_err(io::Error::other),
        FileFormat::Yaml => serde_yaml::from_reader(file).map_err(io::Error::other),
        FileFormat::Toml => {
            let mut s = String::new();
            file.read_to_string(&mut s)?;
            toml::from_str(&s).map_err(io::Error::other)
        }
    }
}
