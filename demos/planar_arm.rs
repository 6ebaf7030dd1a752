//! Example: multi-seed planning for a planar 3-link arm around obstacles.
//!
//! Eight perturbed copies of a straight joint-space seed are optimized in one
//! batch. The best converged slot is printed waypoint by waypoint.
//!
//! Run with `RUST_LOG=debug` to see per-iteration progress.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;
use trajopt::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let chain = KinematicChain::planar_arm(&[0.6, 0.5, 0.3])?;
    let spheres = SphereModel::new(
        &chain,
        vec![
            CollisionSphere::new(0, Vector3::new(0.3, 0.0, 0.0), 0.06),
            CollisionSphere::new(1, Vector3::new(0.25, 0.0, 0.0), 0.05),
            CollisionSphere::new(3, Vector3::zeros(), 0.04),
        ],
    )?;

    let num_waypoints = 24;
    let batch = 8;
    let stepper = TensorStepper::new(
        StepperConfig::new(num_waypoints, 3, 0.05),
        StartState::at_rest(DVector::zeros(3)),
    )?;

    let goal = Vector3::new(-0.2, 1.1, 0.0);
    let cost = TrajectoryCost::builder(chain, stepper)
        .spheres(spheres)
        .obstacles(vec![
            Obstacle::sphere(Vector3::new(0.75, 0.75, 0.0), 0.15),
            Obstacle::aligned_box(Vector3::new(0.3, 1.35, 0.0), Vector3::new(0.15, 0.05, 0.5)),
        ])
        .goals(vec![PoseGoal::position(goal); batch])
        .weights(
            CostWeights::new()
                .with_goal(PoseCostWeights::position_only(100.0))
                .with_smoothness(SmoothnessWeights::none().with_derivatives(5e-3, 1e-4, 0.0)),
        )
        .collision(CollisionConfig::new().with_margin(0.02).with_activation_distance(0.05))
        .build()?;

    let base = linear_seed(&DVector::zeros(3), &DVector::from_vec(vec![1.6, 0.6, 0.3]), num_waypoints)?;
    let mut rng = SmallRng::seed_from_u64(2024);
    let seeds = perturbed_seeds(&base, batch, 0.2, &mut rng)?;

    let optimizer = BatchOptimizer::new(OptimizerConfig::new().with_max_iterations(300));
    let result = optimizer.plan(&cost, &seeds)?;

    println!("Batch of {batch} finished in {:?} after {} iterations", result.duration, result.iterations);
    for (i, slot) in result.slots.iter().enumerate() {
        println!(
            "  slot {i}: {:<16} cost {:>10.6} (goal {:.2e}, collision {:.2e}) in {} iterations",
            slot.status.to_string(),
            slot.cost,
            slot.terms.goal,
            slot.terms.collision,
            slot.iterations,
        );
    }

    let Some((index, best)) = result.best_converged() else {
        println!("No slot converged");
        return Ok(());
    };
    let (position_error, _) = cost.terminal_errors(index, &best.params);
    println!(
        "\nBest slot {index}: clearance {:.4}, goal error {:.2e}",
        cost.min_clearance(&best.params),
        position_error
    );
    if let Some(trajectory) = &best.trajectory {
        for t in 0..trajectory.num_waypoints() {
            let q = trajectory.position(t);
            println!("  t={t:>2}  q = [{:>7.3}, {:>7.3}, {:>7.3}]", q[0], q[1], q[2]);
        }
    }
    Ok(())
}
