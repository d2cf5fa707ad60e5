use torusloc::sim::Robot;
use torusloc::world::torus_distance;
use torusloc::{FilterConfig, ParticleFilter, RandomNoise};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = FilterConfig {
        num_particles: 500,
        process_noise: 0.5,
        measurement_noise: 3.0,
        landmark_positions: vec![20.0, 40.0, 60.0, 80.0],
        ..FilterConfig::default()
    };
    let mut robot = Robot::new(30.0, &config);
    let mut robot_noise = RandomNoise::seeded(1);
    let mut pf = ParticleFilter::seeded(config.clone(), 0)?;

    println!("True position: {:.2}", robot.position());
    println!("Initial estimate: {:.2}", pf.estimate_position());
    let control = 3.0;
    for i in 0..40 {
        robot.move_by(control, &mut robot_noise);
        let observation = robot.observe(&mut robot_noise);
        let resampled = pf.filter_step(control, observation)?;
        let estimate = pf.estimate_position();
        println!(
            "Step {:2}: true={:6.2}, estimate={:6.2}, error={:5.2}, confidence={:.3}{}",
            i + 1,
            robot.position(),
            estimate,
            torus_distance(estimate, robot.position(), config.world_size),
            pf.get_confidence(),
            if resampled { " (resampled)" } else { "" }
        );
    }
    println!("{:?}", pf);
    Ok(())
}
