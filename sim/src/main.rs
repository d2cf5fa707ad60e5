//! TORUSLOC SIM: Monte Carlo localization runs on a one-dimensional toroidal world.
//!
//! A simulated robot drives around a ring of fixed circumference while a particle filter tracks
//! it from the commanded displacements and noisy ranges to the nearest landmark. Each trial writes
//! its per-step record (and optionally every particle) to CSV and the tool logs a summary of the
//! estimation error.
//!
//! You can run simulations either by:
//!   1. Loading all parameters from a configuration file (TOML/JSON/YAML)
//!   2. Specifying parameters via command-line flags

mod common;

use clap::{Args, Parser, Subcommand};
use common::{
    TrialSummary, batch_mean_error, init_logger, particles_path, trial_path, trial_seed,
    validate_output_path,
};
use log::{error, info};
use rayon::prelude::*;
use std::error::Error;
use std::path::{Path, PathBuf};
use torusloc::sim::{ControlProfile, SimulationConfig, run_simulation};
use torusloc::{FilterConfig, ResamplingStrategy};

const LONG_ABOUT: &str =
    "TORUSLOC SIM: Monte Carlo localization runs on a one-dimensional toroidal world.

A simulated robot moves around a ring with noisy motion and reports the noisy distance to its
nearest landmark. A particle filter estimates the robot's position from the commanded controls
and those ranges, resampling when its effective sample size collapses.

Each trial k writes <output>/trial_k.csv, and <output>/trial_k_particles.csv when particle
recording is enabled. Trials use consecutive seed pairs, so a batch is fully reproducible.

You can run simulations either by:
  1. Loading all parameters from a configuration file (TOML/JSON/YAML)
  2. Specifying parameters via command-line flags";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Particle filter localization on a toroidal world.", long_about = LONG_ABOUT)]
struct Cli {
    /// Run simulation from a configuration file (TOML/JSON/YAML)
    /// Filter and scenario flags of `run` are ignored when this is set
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Run Monte Carlo trials in parallel
    #[arg(long, global = true)]
    parallel: bool,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run one or more localization trials",
        long_about = "Run particle filter localization trials against a simulated robot. Every trial uses the same scenario with its own seed pair and writes a per-step CSV to the output directory."
    )]
    Run(RunArgs),

    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

/// Batch arguments shared by flag-driven and config-driven runs
#[derive(Args, Clone, Debug)]
struct BatchArgs {
    /// Number of independent trials
    #[arg(long, default_value_t = 1)]
    trials: usize,

    /// Output directory for the trial CSV files
    #[arg(short, long, default_value = "results")]
    output: PathBuf,
}

impl Default for BatchArgs {
    fn default() -> Self {
        BatchArgs {
            trials: 1,
            output: PathBuf::from("results"),
        }
    }
}

/// Scenario and filter arguments for the `run` subcommand
#[derive(Args, Clone, Debug)]
struct RunArgs {
    #[command(flatten)]
    batch: BatchArgs,

    /// Circumference of the world
    #[arg(long, default_value_t = 100.0)]
    world_size: f64,

    /// Number of particles
    #[arg(short = 'n', long, default_value_t = 1000)]
    num_particles: usize,

    /// Motion noise standard deviation
    #[arg(long, default_value_t = 0.5)]
    process_noise: f64,

    /// Range noise standard deviation
    #[arg(long, default_value_t = 3.0)]
    measurement_noise: f64,

    /// Landmark positions, comma separated
    #[arg(long, value_delimiter = ',', default_value = "20,40,60,80")]
    landmarks: Vec<f64>,

    /// Resample when ESS falls below this fraction of the particle count
    #[arg(long, default_value_t = 0.5)]
    resample_threshold: f64,

    /// Resampling scheme
    #[arg(long, value_enum, default_value_t = ResamplingStrategy::Systematic)]
    resampling: ResamplingStrategy,

    /// True starting position of the robot
    #[arg(long, default_value_t = 25.0)]
    initial_position: f64,

    /// Number of filter steps per trial
    #[arg(long, default_value_t = 50)]
    steps: usize,

    /// Commanded displacement per step (the initial one when accelerating)
    #[arg(long, default_value_t = 2.0, allow_negative_numbers = true)]
    control: f64,

    /// Increase the commanded displacement by this much every step
    #[arg(long, allow_negative_numbers = true)]
    control_increment: Option<f64>,

    /// Base seed; trial k uses seeds base + 2k and base + 2k + 1
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Also write every particle at every step
    #[arg(long)]
    record_particles: bool,
}

impl RunArgs {
    fn to_config(&self) -> SimulationConfig {
        let control = match self.control_increment {
            Some(increment) => ControlProfile::Accelerating {
                initial: self.control,
                increment,
            },
            None => ControlProfile::Constant {
                displacement: self.control,
            },
        };
        SimulationConfig {
            initial_position: self.initial_position,
            steps: self.steps,
            seed: self.seed,
            record_particles: self.record_particles,
            filter: FilterConfig {
                world_size: self.world_size,
                num_particles: self.num_particles,
                process_noise: self.process_noise,
                measurement_noise: self.measurement_noise,
                landmark_positions: self.landmarks.clone(),
                resample_threshold: self.resample_threshold,
                resampling: self.resampling,
            },
            control,
            ..SimulationConfig::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output path for the template; the extension selects the format (.toml, .json, .yaml)
    #[arg(short, long, default_value = "torusloc.toml")]
    output: PathBuf,
}

/// Run a single trial and write its CSV files.
fn run_trial(
    config: &SimulationConfig,
    trial: usize,
    output: &Path,
) -> Result<TrialSummary, Box<dyn Error>> {
    let seed = trial_seed(config.seed, trial);
    let trial_config = SimulationConfig {
        seed,
        ..config.clone()
    };
    let mut result = run_simulation(&trial_config)?;
    result.name = format!("trial_{trial}");

    let path = trial_path(output, trial);
    result.to_csv(&path)?;
    info!("Trial {} results written to {}", trial, path.display());
    if config.record_particles {
        let path = particles_path(output, trial);
        result.snapshots_to_csv(&path)?;
        info!("Trial {} particles written to {}", trial, path.display());
    }
    Ok(TrialSummary::from_result(trial, seed, &result))
}

/// Run a batch of trials, sequentially or on the rayon pool.
fn run_batch(
    config: &SimulationConfig,
    batch: &BatchArgs,
    parallel: bool,
) -> Result<Vec<TrialSummary>, Box<dyn Error>> {
    config.filter.validate()?;
    validate_output_path(&batch.output)?;
    info!(
        "Running {} trial(s) of {} steps with {} particles{}",
        batch.trials,
        config.steps,
        config.filter.num_particles,
        if parallel { " in parallel" } else { "" }
    );

    // Box<dyn Error> is not Send, so parallel failures travel as strings
    let outcomes: Vec<Result<TrialSummary, String>> = if parallel && batch.trials > 1 {
        (0..batch.trials)
            .into_par_iter()
            .map(|k| run_trial(config, k, &batch.output).map_err(|e| e.to_string()))
            .collect()
    } else {
        (0..batch.trials)
            .map(|k| run_trial(config, k, &batch.output).map_err(|e| e.to_string()))
            .collect()
    };

    let mut summaries = Vec::with_capacity(outcomes.len());
    let mut failures = 0usize;
    for (k, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                failures += 1;
                error!("Trial {} failed: {}", k, e);
            }
        }
    }
    if failures > 0 {
        return Err(format!("{} trial(s) failed", failures).into());
    }
    Ok(summaries)
}

fn log_summaries(summaries: &[TrialSummary]) {
    for s in summaries {
        info!(
            "Trial {} (seed {}): mean error {:.3}, last-{} mean error {:.3}, final error {:.3}, {} resample(s)",
            s.trial,
            s.seed,
            s.mean_error,
            common::RECENT_WINDOW,
            s.recent_error,
            s.final_error,
            s.resamples
        );
    }
    if summaries.len() > 1
        && let Some(mean) = batch_mean_error(summaries)
    {
        info!(
            "Mean error over {} trials: {:.3}",
            summaries.len(),
            mean
        );
    }
}

/// Execute simulation from a configuration file
fn run_from_config(
    config_path: &Path,
    batch: &BatchArgs,
    parallel: bool,
) -> Result<(), Box<dyn Error>> {
    info!("Loading configuration from {}", config_path.display());
    let config = SimulationConfig::from_file(config_path)?;
    info!("Configuration loaded successfully");
    info!("Landmarks: {:?}", config.filter.landmark_positions);
    info!("Control: {:?}", config.control);
    info!("Output: {}", batch.output.display());

    let summaries = run_batch(&config, batch, parallel)?;
    log_summaries(&summaries);
    Ok(())
}

fn run_cli(args: &RunArgs, parallel: bool) -> Result<(), Box<dyn Error>> {
    let config = args.to_config();
    let summaries = run_batch(&config, &args.batch, parallel)?;
    log_summaries(&summaries);
    Ok(())
}

fn create_config_file(args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = args.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    SimulationConfig::default().to_file(&args.output)?;
    println!("Template configuration written to {}", args.output.display());
    println!("\nYou can now run the simulation with:");
    println!("  torusloc-sim --config {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // If --config is provided, load config and potentially override logger with config values
    if let Some(ref config_path) = cli.config {
        let config = SimulationConfig::from_file(config_path)?;
        let log_level = config.logging.level.as_str();
        let config_log_file = config.logging.file.as_ref().map(PathBuf::from);
        let log_file = cli.log_file.as_ref().or(config_log_file.as_ref());
        init_logger(log_level, log_file)?;

        let batch = match cli.command {
            Some(Command::Run(args)) => args.batch,
            _ => BatchArgs::default(),
        };
        return run_from_config(config_path, &batch, cli.parallel);
    }

    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    match cli.command {
        Some(Command::Run(args)) => run_cli(&args, cli.parallel),
        Some(Command::CreateConfig(args)) => create_config_file(&args),
        None => {
            eprintln!("Error: No command provided. Use -h or --help for usage information.");
            std::process::exit(1);
        }
    }
}
