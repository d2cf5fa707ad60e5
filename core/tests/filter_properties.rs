//! Property tests for the toroidal particle filter
//!
//! These tests drive the public API only and check the behavioural guarantees of the filter:
//! weight normalization, domain containment, wrap-around prediction, the circular estimate at the
//! seam, resampling conservation, degeneracy recovery, convergence on a fixed target and the
//! adaptive resampling trigger.
//!
//! Stochastic scenarios use fixed seeds. Their thresholds are loose enough to hold for any
//! reasonable seed, so they also act as regression checks on the estimator.
use assert_approx_eq::assert_approx_eq;

use torusloc::noise::{DeterministicNoise, NoiseSource, RandomNoise};
use torusloc::world::torus_distance;
use torusloc::{FilterConfig, FilterError, ParticleFilter, ResamplingStrategy, WeightUpdate};

/// Tolerance on the weight sum after any update or resample
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

fn assert_normalized<S: NoiseSource>(pf: &ParticleFilter<S>) {
    let sum: f64 = pf.weights().iter().sum();
    assert!(
        (sum - 1.0).abs() < WEIGHT_SUM_TOLERANCE,
        "weights sum to {sum}"
    );
    assert!(pf.weights().iter().all(|w| w.is_finite() && *w >= 0.0));
}

fn assert_contained<S: NoiseSource>(pf: &ParticleFilter<S>) {
    let world_size = pf.config().world_size;
    for &x in pf.positions() {
        assert!(
            (0.0..world_size).contains(&x),
            "particle at {x} outside [0, {world_size})"
        );
    }
}

fn landmark_config(num_particles: usize, landmarks: Vec<f64>) -> FilterConfig {
    FilterConfig {
        world_size: 100.0,
        num_particles,
        process_noise: 0.5,
        measurement_noise: 2.0,
        landmark_positions: landmarks,
        resample_threshold: 0.5,
        resampling: ResamplingStrategy::Systematic,
    }
}

#[test]
fn weights_stay_normalized_through_random_steps() {
    for strategy in [
        ResamplingStrategy::Systematic,
        ResamplingStrategy::Multinomial,
        ResamplingStrategy::Residual,
    ] {
        let config = FilterConfig {
            resampling: strategy,
            ..landmark_config(300, vec![15.0, 55.0, 70.0])
        };
        let mut pf = ParticleFilter::seeded(config, 17).unwrap();
        let mut inputs = RandomNoise::seeded(18);
        assert_normalized(&pf);
        for _ in 0..60 {
            let control = inputs.gaussian(3.0);
            let observation = inputs.uniform() * 30.0;
            pf.predict(control).unwrap();
            pf.update(observation).unwrap();
            assert_normalized(&pf);
            pf.resample();
            assert_normalized(&pf);
        }
    }
}

#[test]
fn positions_stay_in_domain_after_predict_and_resample() {
    let config = FilterConfig {
        process_noise: 25.0,
        ..landmark_config(500, vec![5.0, 95.0])
    };
    let mut pf = ParticleFilter::seeded(config, 3).unwrap();
    let controls = [-250.0, 199.9, -0.001, 1e6, -1e6, 99.999_999];
    for (i, &control) in controls.iter().cycle().take(40).enumerate() {
        pf.predict(control).unwrap();
        assert_contained(&pf);
        pf.update((i % 7) as f64).unwrap();
        pf.force_resample();
        assert_contained(&pf);
    }
}

#[test]
fn prediction_wraps_at_the_seam() {
    let config = FilterConfig {
        world_size: 200.0,
        num_particles: 1,
        process_noise: 0.0,
        ..FilterConfig::default()
    };
    let mut pf = ParticleFilter::from_positions(config, &[199.0], DeterministicNoise::default())
        .unwrap();
    pf.predict(5.0).unwrap();
    assert_approx_eq!(pf.positions()[0], 4.0, 1e-12);
}

#[test]
fn prediction_with_stubbed_noise_is_exact() {
    // non-zero configured noise, but the stubbed source zeroes every draw
    let config = FilterConfig {
        world_size: 200.0,
        num_particles: 3,
        process_noise: 5.0,
        ..FilterConfig::default()
    };
    let mut pf = ParticleFilter::from_positions(
        config,
        &[0.0, 100.0, 199.0],
        DeterministicNoise::default(),
    )
    .unwrap();
    pf.predict(-3.0).unwrap();
    assert_approx_eq!(pf.positions()[0], 197.0, 1e-12);
    assert_approx_eq!(pf.positions()[1], 97.0, 1e-12);
    assert_approx_eq!(pf.positions()[2], 196.0, 1e-12);
}

#[test]
fn circular_mean_across_the_seam() {
    let config = FilterConfig {
        world_size: 200.0,
        num_particles: 2,
        ..FilterConfig::default()
    };
    let pf = ParticleFilter::from_positions(config, &[1.0, 199.0], DeterministicNoise::default())
        .unwrap();
    let estimate = pf.estimate_position();
    assert!(
        torus_distance(estimate, 0.0, 200.0) < 1e-6,
        "estimate {estimate} should be near 0, not 100"
    );
}

#[test]
fn resampling_conserves_population() {
    let mut pf = ParticleFilter::seeded(landmark_config(400, vec![50.0]), 21).unwrap();
    pf.update(0.0).unwrap();
    assert!(pf.resample(), "a sharp observation must trigger a resample");
    assert_eq!(pf.positions().len(), 400);
    assert_eq!(pf.weights().len(), 400);
    for &w in pf.weights() {
        assert_approx_eq!(w, 1.0 / 400.0, 1e-15);
    }

    pf.force_resample();
    assert_eq!(pf.positions().len(), 400);
    assert!(pf.weights().iter().all(|&w| w == 1.0 / 400.0));
}

#[test]
fn degenerate_observation_recovers_to_uniform() {
    let config = FilterConfig {
        measurement_noise: 1.0,
        ..landmark_config(250, vec![50.0])
    };
    let mut pf = ParticleFilter::seeded(config, 5).unwrap();
    let outcome = pf.update(1e6).unwrap();
    assert_eq!(outcome, WeightUpdate::DegenerateReset);
    assert!(pf.weights().iter().all(|w| !w.is_nan()));
    assert_normalized(&pf);

    // the recovered filter keeps working
    let resampled = pf.filter_step(0.0, 1e6).unwrap();
    assert!(!resampled);
    assert_normalized(&pf);
    assert_eq!(pf.update(3.0).unwrap(), WeightUpdate::Normalized);
}

#[test]
fn converges_on_a_fixed_target() {
    let config = FilterConfig {
        world_size: 100.0,
        num_particles: 1000,
        process_noise: 0.5,
        measurement_noise: 2.0,
        landmark_positions: vec![50.0],
        resample_threshold: 0.5,
        resampling: ResamplingStrategy::Systematic,
    };
    let mut pf = ParticleFilter::seeded(config, 2024).unwrap();
    let mut sensor = RandomNoise::seeded(99);

    let initial_confidence = pf.get_confidence();
    let mut confidences = Vec::with_capacity(30);
    for _ in 0..30 {
        // true position fixed on the landmark: observations are |noise| around zero
        let observation = sensor.gaussian(0.1).abs();
        pf.filter_step(0.0, observation).unwrap();
        confidences.push(pf.get_confidence());
    }

    assert!(initial_confidence < 0.2, "initial {initial_confidence}");
    assert!(confidences[0] > initial_confidence);
    let late: f64 = confidences[25..].iter().sum::<f64>() / 5.0;
    assert!(late >= confidences[0] - 1e-3, "late {late} vs first {}", confidences[0]);
    for window in confidences.windows(2) {
        assert!(window[1] > window[0] - 0.01, "confidence dropped: {window:?}");
    }
    let estimate = pf.estimate_position();
    assert!(
        torus_distance(estimate, 50.0, 100.0) < 2.0,
        "estimate {estimate} after 30 steps"
    );
}

#[test]
fn full_threshold_resamples_every_step() {
    let config = FilterConfig {
        resample_threshold: 1.0,
        ..landmark_config(200, vec![20.0, 70.0])
    };
    let mut pf = ParticleFilter::seeded(config, 8).unwrap();
    let mut sensor = RandomNoise::seeded(9);
    for step in 0..25 {
        let observation = 5.0 + sensor.gaussian(1.0);
        assert!(pf.filter_step(1.0, observation).unwrap(), "step {step}");
    }
}

#[test]
fn tiny_threshold_rarely_resamples() {
    let config = FilterConfig {
        resample_threshold: 1e-3,
        ..landmark_config(200, vec![20.0, 70.0])
    };
    let mut pf = ParticleFilter::seeded(config, 8).unwrap();
    let mut sensor = RandomNoise::seeded(9);
    let resamples = (0..25)
        .filter(|_| {
            let observation = 5.0 + sensor.gaussian(1.0);
            pf.filter_step(1.0, observation).unwrap()
        })
        .count();
    assert!(resamples <= 2, "resampled {resamples} times");
}

#[test]
fn invalid_configurations_are_rejected() {
    let cases = [
        FilterConfig {
            num_particles: 0,
            ..FilterConfig::default()
        },
        FilterConfig {
            world_size: 0.0,
            ..FilterConfig::default()
        },
        FilterConfig {
            measurement_noise: -1.0,
            ..FilterConfig::default()
        },
        FilterConfig {
            landmark_positions: vec![],
            ..FilterConfig::default()
        },
    ];
    for config in cases {
        let err = ParticleFilter::seeded(config.clone(), 1).unwrap_err();
        assert!(
            matches!(err, FilterError::InvalidConfiguration { .. }),
            "{config:?} gave {err:?}"
        );
    }
}

#[test]
fn rejected_inputs_leave_state_untouched() {
    let mut pf = ParticleFilter::seeded(landmark_config(100, vec![50.0]), 4).unwrap();
    pf.filter_step(1.0, 3.0).unwrap();
    let before = pf.state().clone();
    for (control, observation) in [(f64::NAN, 1.0), (1.0, f64::NAN), (f64::INFINITY, 0.0)] {
        let err = pf.filter_step(control, observation).unwrap_err();
        assert!(matches!(err, FilterError::InvalidInput { .. }));
    }
    assert!(pf.predict(f64::NEG_INFINITY).is_err());
    assert!(pf.update(f64::INFINITY).is_err());
    assert_eq!(pf.state(), &before);
}

#[test]
fn same_seed_same_trajectory() {
    let config = landmark_config(300, vec![10.0, 45.0]);
    let mut a = ParticleFilter::seeded(config.clone(), 77).unwrap();
    let mut b = ParticleFilter::seeded(config, 77).unwrap();
    for k in 0..20 {
        let control = 1.5;
        let observation = (k % 9) as f64;
        assert_eq!(
            a.filter_step(control, observation).unwrap(),
            b.filter_step(control, observation).unwrap()
        );
    }
    assert_eq!(a.positions(), b.positions());
    assert_eq!(a.weights(), b.weights());
}
