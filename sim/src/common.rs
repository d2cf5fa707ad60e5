//! Shared helpers for the simulation CLI: logger setup, output paths and trial bookkeeping.

use std::error::Error;
use std::path::{Path, PathBuf};

use torusloc::sim::SimulationResult;

/// Number of trailing steps used for the "recent" error in trial summaries.
pub const RECENT_WINDOW: usize = 10;

/// Initialize the logger with the specified configuration.
///
/// # Arguments
/// * `log_level` - Log level string (off, error, warn, info, debug, trace)
/// * `log_file` - Optional path to log file (logs to stderr if None)
///
/// # Errors
/// Returns an error if the log file cannot be opened or logger initialization fails.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

/// Create the output directory if it does not exist yet.
///
/// # Errors
/// Returns an error if the path exists but is not a directory, or if creation fails.
pub fn validate_output_path(output: &Path) -> Result<(), Box<dyn Error>> {
    if !output.exists() {
        std::fs::create_dir_all(output)?;
    } else if !output.is_dir() {
        return Err(format!(
            "Output path '{}' exists and is not a directory.",
            output.display()
        )
        .into());
    }
    Ok(())
}

/// Seed for trial `trial` of a batch started from `base`.
///
/// Each run consumes two streams (`seed` for the filter, `seed + 1` for the robot), so trials are
/// spaced two apart to keep every stream distinct.
pub fn trial_seed(base: u64, trial: usize) -> u64 {
    base.wrapping_add(2 * trial as u64)
}

/// Per-step CSV path for a trial.
pub fn trial_path(output: &Path, trial: usize) -> PathBuf {
    output.join(format!("trial_{trial}.csv"))
}

/// Particle snapshot CSV path for a trial.
pub fn particles_path(output: &Path, trial: usize) -> PathBuf {
    output.join(format!("trial_{trial}_particles.csv"))
}

/// Headline numbers of one finished trial.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialSummary {
    pub trial: usize,
    pub seed: u64,
    pub mean_error: f64,
    pub recent_error: f64,
    pub final_error: f64,
    pub resamples: usize,
}

impl TrialSummary {
    /// Summarize a run. Empty runs (zero steps) report `NaN` errors.
    pub fn from_result(trial: usize, seed: u64, result: &SimulationResult) -> Self {
        TrialSummary {
            trial,
            seed,
            mean_error: result.mean_error().unwrap_or(f64::NAN),
            recent_error: result.recent_mean_error(RECENT_WINDOW).unwrap_or(f64::NAN),
            final_error: result.final_error().unwrap_or(f64::NAN),
            resamples: result.resample_count(),
        }
    }
}

/// Average of the per-trial mean errors, skipping trials without steps.
pub fn batch_mean_error(summaries: &[TrialSummary]) -> Option<f64> {
    let errors: Vec<f64> = summaries
        .iter()
        .map(|s| s.mean_error)
        .filter(|e| e.is_finite())
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.iter().sum::<f64>() / errors.len() as f64)
    }
}
