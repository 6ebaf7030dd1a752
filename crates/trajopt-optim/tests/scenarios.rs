//! End-to-end planning scenarios on a planar two-link arm.
//!
//! The arm has links of 1.0 and 0.8, so with `q = 0` the tool sits at
//! `(1.8, 0, 0)`. Goals are generated from known configurations so they are
//! always reachable.

use nalgebra::Vector3;
use pretty_assertions::assert_eq;
use trajopt_core::{
    cost_function::CostFunction,
    error::OptimizerError,
    types::{DMatrix, DVector},
};
use trajopt_geometry::{CollisionConfig, Obstacle, PoseCostWeights, PoseGoal};
use trajopt_kinematics::{CollisionSphere, JacobianRequest, KinematicChain, SphereModel};
use trajopt_optim::{
    linear_seed, BatchOptimizer, CancellationToken, CostWeights, OptimizerConfig,
    SlotStatus, SmoothnessWeights, StartState, StepperConfig, TensorStepper, TrajectoryCost,
};

fn arm() -> KinematicChain<f64> {
    KinematicChain::planar_arm(&[1.0, 0.8]).unwrap()
}

fn tool_position(chain: &KinematicChain<f64>, q: [f64; 2]) -> Vector3<f64> {
    let state = chain.forward_unchecked(&DVector::from_vec(q.to_vec()), JacobianRequest::None);
    state.end_effector_pose().position()
}

fn stepper(num_waypoints: usize) -> TensorStepper<f64> {
    TensorStepper::new(
        StepperConfig::new(num_waypoints, 2, 0.1),
        StartState::at_rest(DVector::zeros(2)),
    )
    .unwrap()
}

fn weights(velocity: f64) -> CostWeights<f64> {
    CostWeights::new()
        .with_goal(PoseCostWeights::position_only(100.0))
        .with_smoothness(SmoothnessWeights::none().with_derivatives(velocity, 1e-4, 0.0))
}

fn config() -> OptimizerConfig<f64> {
    OptimizerConfig::new()
        .with_max_iterations(400)
        .with_gradient_tolerance(1e-6)
        .with_trace(true)
}

fn seed_towards(q: [f64; 2], num_waypoints: usize) -> DMatrix<f64> {
    linear_seed(&DVector::zeros(2), &DVector::from_vec(q.to_vec()), num_waypoints).unwrap()
}

fn reach_targets() -> Vec<[f64; 2]> {
    (0..7).map(|k| [0.3 * k as f64 - 0.9, 0.4 + 0.1 * k as f64]).collect()
}

#[test]
fn reaches_a_position_goal() {
    let chain = arm();
    let goal = tool_position(&chain, [0.7, 1.0]);
    let cost = TrajectoryCost::builder(chain, stepper(8))
        .goals(vec![PoseGoal::position(goal)])
        .weights(
            CostWeights::new()
                .with_goal(PoseCostWeights::position_only(100.0))
                .with_smoothness(SmoothnessWeights::none()),
        )
        .build()
        .unwrap();

    let result = BatchOptimizer::new(config())
        .plan(&cost, &[seed_towards([0.9, 0.6], 8)])
        .unwrap();
    let slot = &result.slots[0];

    assert_eq!(slot.status, SlotStatus::Converged);
    assert!(slot.iterations < 50);
    assert!(slot.terms.goal < 1e-8);
    let (position_error, _) = cost.terminal_errors(0, &slot.params);
    assert!(position_error <= cost.tolerance().position);
    assert!(slot.best_trace.windows(2).all(|w| w[1] <= w[0]));

    let trajectory = slot.trajectory.as_ref().unwrap();
    assert_eq!(trajectory.num_waypoints(), 8);
    assert_eq!(trajectory.position(0), DVector::zeros(2));
}

#[test]
fn reaches_a_position_goal_smoothly() {
    let chain = arm();
    let goal = tool_position(&chain, [0.7, 1.0]);
    let cost = TrajectoryCost::builder(chain, stepper(12))
        .goals(vec![PoseGoal::position(goal)])
        .weights(weights(5e-3))
        .build()
        .unwrap();

    let result = BatchOptimizer::new(config())
        .plan(&cost, &[seed_towards([0.9, 0.6], 12)])
        .unwrap();
    let slot = &result.slots[0];

    assert_eq!(slot.status, SlotStatus::Converged);
    assert!(cost.is_satisfied(0, &slot.params));
    assert!(slot.terms.smoothness > 0.0);
}

#[test]
fn routes_around_a_sphere_obstacle() {
    let chain = arm();
    let target = [1.2, 0.6];
    let goal = tool_position(&chain, target);
    let spheres = SphereModel::new(&chain, vec![CollisionSphere::new(2, Vector3::zeros(), 0.05)]).unwrap();
    let collision = CollisionConfig::new().with_margin(0.02).with_activation_distance(0.05);
    let cost = TrajectoryCost::builder(chain, stepper(12))
        .spheres(spheres)
        // Just outside the tool path of the straight joint-space seed
        .obstacles(vec![Obstacle::sphere(Vector3::new(1.397, 1.258, 0.0), 0.2)])
        .goals(vec![PoseGoal::position(goal)])
        .weights(weights(5e-3))
        .collision(collision)
        .build()
        .unwrap();

    let seed = seed_towards(target, 12);
    let seed_params = cost.stepper().params_from_positions(&seed).unwrap();
    assert!(cost.min_clearance(&seed_params) < 0.0);

    let result = BatchOptimizer::new(config()).plan(&cost, &[seed]).unwrap();
    let slot = &result.slots[0];

    assert_eq!(slot.status, SlotStatus::Converged);
    assert!(cost.min_clearance(&slot.params) >= collision.margin);
    assert!(cost.is_satisfied(0, &slot.params));
}

#[test]
fn slots_are_independent_of_their_batch() {
    let chain = arm();
    let targets = reach_targets();
    let mut goals: Vec<_> = targets.iter().map(|&q| PoseGoal::position(tool_position(&chain, q))).collect();
    let seeds: Vec<_> = targets.iter().map(|q| seed_towards([q[0] + 0.3, q[1] - 0.2], 8)).collect();

    let reachable = TrajectoryCost::builder(chain, stepper(8))
        .goals(goals.clone())
        .weights(weights(2e-3))
        .build()
        .unwrap();

    // Out of reach straight up, seeded like the others
    goals.insert(3, PoseGoal::position(Vector3::new(0.0, 3.0, 0.0)));
    let mixed = reachable.with_goals(goals).unwrap();
    let mut mixed_seeds = seeds.clone();
    mixed_seeds.insert(3, seed_towards([1.2, 0.3], 8));

    let optimizer = BatchOptimizer::new(config());
    let alone = optimizer.plan(&reachable, &seeds).unwrap();
    let together = optimizer.plan(&mixed, &mixed_seeds).unwrap();

    assert_eq!(alone.count(SlotStatus::Converged), 7);
    assert_eq!(together.count(SlotStatus::Converged), 7);
    assert_eq!(together.slots[3].status, SlotStatus::BudgetExhausted);

    let others = together.slots.iter().enumerate().filter(|(i, _)| *i != 3).map(|(_, s)| s);
    for (a, b) in alone.slots.iter().zip(others) {
        assert_eq!(a.params, b.params);
        assert_eq!(a.cost, b.cost);
        assert_eq!(a.status, b.status);
        assert_eq!(a.iterations, b.iterations);
    }
}

#[test]
fn trajectory_starts_at_the_start_state_whatever_the_seed() {
    let chain = arm();
    let goal = tool_position(&chain, [0.7, 1.0]);
    let cost = TrajectoryCost::builder(chain, stepper(8))
        .goals(vec![PoseGoal::position(goal)])
        .weights(weights(5e-3))
        .build()
        .unwrap();

    let mut seed = cost.stepper().params_from_positions(&seed_towards([0.9, 0.6], 8)).unwrap();
    let clean = seed.clone();
    seed[0] = 2.0;
    seed[1] = -2.0;
    assert_eq!(cost.cost(0, &seed), cost.cost(0, &clean));

    let result = BatchOptimizer::new(config()).optimize(&cost, vec![seed]).unwrap();
    let trajectory = cost.rollout(&result.slots[0].params);
    assert_eq!(trajectory.position(0), DVector::zeros(2));
    assert_eq!(trajectory.velocities.row(0).transpose(), DVector::zeros(2));
}

#[test]
fn cancelled_plan_returns_seeds() {
    let chain = arm();
    let goal = tool_position(&chain, [0.7, 1.0]);
    let cost = TrajectoryCost::builder(chain, stepper(6))
        .goals(vec![PoseGoal::position(goal); 2])
        .weights(weights(5e-3))
        .build()
        .unwrap();
    let seeds = vec![seed_towards([0.5, 0.5], 6), seed_towards([1.0, 0.2], 6)];

    let token = CancellationToken::new();
    token.cancel();
    let result = BatchOptimizer::new(config()).plan_with_cancel(&cost, &seeds, &token).unwrap();

    assert_eq!(result.count(SlotStatus::Cancelled), 2);
    for (slot, seed) in result.slots.iter().zip(&seeds) {
        assert_eq!(slot.params, cost.stepper().params_from_positions(seed).unwrap());
        assert!(slot.trajectory.is_some());
    }
}

#[test]
fn rejects_malformed_batches() {
    let chain = arm();
    let goal = tool_position(&chain, [0.7, 1.0]);
    let cost = TrajectoryCost::builder(chain, stepper(6))
        .goals(vec![PoseGoal::position(goal); 2])
        .build()
        .unwrap();
    let optimizer = BatchOptimizer::new(config());

    assert!(matches!(optimizer.plan(&cost, &[]), Err(OptimizerError::EmptyBatch)));
    assert!(matches!(
        optimizer.plan(&cost, &[seed_towards([0.5, 0.5], 6)]),
        Err(OptimizerError::BatchSizeMismatch { expected: 2, actual: 1 })
    ));
    assert!(matches!(
        optimizer.plan(&cost, &[DMatrix::zeros(5, 2), DMatrix::zeros(5, 2)]),
        Err(OptimizerError::Model(_))
    ));
}

#[cfg(feature = "serde")]
#[test]
fn config_round_trips_through_json() {
    let config = config().with_memory_size(7).with_patience(5);
    let json = serde_json::to_string(&config).unwrap();
    let back: OptimizerConfig<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);
}
