//! Trajectory cost aggregation.
//!
//! [`TrajectoryCost`] turns a parameter vector into one scalar cost and its
//! gradient for one batch slot. An evaluation:
//!
//! 1. rolls the parameters out with the [`TensorStepper`],
//! 2. runs fused kinematics at every free waypoint and evaluates the goal,
//!    obstacle and self-collision terms there (in parallel across waypoints
//!    for long trajectories),
//! 3. adds the smoothness, terminal and joint-limit terms on the rolled-out
//!    state,
//! 4. pulls the state gradient back to the parameters.
//!
//! Per-waypoint terms are collected in waypoint order and summed with
//! [`pairwise_sum`], so the result does not depend on thread scheduling. The
//! cost value does not depend on whether a gradient was requested.

use crate::{
    bounds::bounds_cost,
    smoothness::{smoothness_cost, terminal_cost, SmoothnessWeights},
    tensor_step::{StateGradient, TensorStepper, TrajectoryState},
};
use std::sync::Arc;
use trajopt_core::{
    cost_function::{CostEvaluation, CostFunction, CostTerms},
    error::{ModelError, OptimizerError, OptimizerResult, Result},
    parallel::{pairwise_sum, ParallelBatch, ParallelConfig},
    types::{DVector, Scalar},
};
use trajopt_geometry::{
    min_clearance, obstacle_cost, pose_distance, validate_obstacles, CollisionConfig, Obstacle,
    PoseCostWeights, PoseGoal, SelfCollisionPairs,
};
use trajopt_kinematics::{JacobianRequest, KinematicChain, KinematicsState, SphereModel, SpherePose};

/// Weights of every cost term.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostWeights<T: Scalar> {
    /// Goal pose weights, applied in full at the last waypoint
    pub goal: PoseCostWeights<T>,
    /// Fraction of the goal cost applied at intermediate waypoints
    pub run_weight: T,
    /// Weight of the sphere–obstacle cost (zero disables collision checking)
    pub collision: T,
    /// Weight of the self-collision cost (zero disables it)
    pub self_collision: T,
    /// Smoothness and terminal weights
    pub smoothness: SmoothnessWeights<T>,
    /// Weight of the joint-limit cost
    pub bounds: T,
}

impl<T: Scalar> Default for CostWeights<T> {
    fn default() -> Self {
        Self {
            goal: PoseCostWeights::default(),
            run_weight: T::zero(),
            collision: <T as Scalar>::from_f64(100.0),
            self_collision: <T as Scalar>::from_f64(100.0),
            smoothness: SmoothnessWeights::default(),
            bounds: <T as Scalar>::from_f64(10.0),
        }
    }
}

impl<T: Scalar> CostWeights<T> {
    /// Creates the default weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the goal weights.
    pub fn with_goal(mut self, goal: PoseCostWeights<T>) -> Self {
        self.goal = goal;
        self
    }

    /// Sets the running goal weight.
    pub fn with_run_weight(mut self, run_weight: T) -> Self {
        self.run_weight = run_weight;
        self
    }

    /// Sets the obstacle and self-collision weights.
    pub fn with_collision(mut self, collision: T, self_collision: T) -> Self {
        self.collision = collision;
        self.self_collision = self_collision;
        self
    }

    /// Sets the smoothness weights.
    pub fn with_smoothness(mut self, smoothness: SmoothnessWeights<T>) -> Self {
        self.smoothness = smoothness;
        self
    }

    /// Sets the joint-limit weight.
    pub fn with_bounds(mut self, bounds: T) -> Self {
        self.bounds = bounds;
        self
    }

    /// Checks that every weight is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        self.goal.validate()?;
        self.smoothness.validate()?;
        let ok = |w: T| w.is_finite() && w >= T::zero();
        if ok(self.run_weight) && ok(self.collision) && ok(self.self_collision) && ok(self.bounds) {
            Ok(())
        } else {
            Err(ModelError::invalid_parameter(
                "cost weights must be finite and non-negative",
            ))
        }
    }
}

/// Terminal pose tolerances used by [`CostFunction::is_satisfied`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GoalTolerance<T> {
    /// Maximum Euclidean position error
    pub position: T,
    /// Maximum rotation error in radians (ignored when rotation is not tracked)
    pub rotation: T,
}

impl<T: Scalar> Default for GoalTolerance<T> {
    fn default() -> Self {
        Self {
            position: <T as Scalar>::from_f64(5e-3),
            rotation: <T as Scalar>::from_f64(0.05),
        }
    }
}

impl<T: Scalar> GoalTolerance<T> {
    /// Creates a tolerance.
    pub fn new(position: T, rotation: T) -> Self {
        Self { position, rotation }
    }

    /// Checks that both tolerances are finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let ok = |v: T| v.is_finite() && v >= T::zero();
        if ok(self.position) && ok(self.rotation) {
            Ok(())
        } else {
            Err(ModelError::invalid_parameter("goal tolerances must be finite and non-negative"))
        }
    }
}

#[derive(Debug, Clone)]
struct WaypointCost<T: Scalar> {
    terms: CostTerms<T>,
    gradient: Option<DVector<T>>,
}

/// Cost of a batch of trajectories sharing one robot and one scene.
#[derive(Debug, Clone)]
pub struct TrajectoryCost<T: Scalar> {
    chain: Arc<KinematicChain<T>>,
    spheres: Arc<SphereModel<T>>,
    pairs: Arc<SelfCollisionPairs>,
    obstacles: Arc<Vec<Obstacle<T>>>,
    goals: Vec<PoseGoal<T>>,
    stepper: TensorStepper<T>,
    weights: CostWeights<T>,
    collision: CollisionConfig<T>,
    tolerance: GoalTolerance<T>,
    parallel: ParallelConfig,
}

/// Builder for [`TrajectoryCost`].
#[derive(Debug, Clone)]
pub struct TrajectoryCostBuilder<T: Scalar> {
    chain: Arc<KinematicChain<T>>,
    stepper: TensorStepper<T>,
    spheres: Arc<SphereModel<T>>,
    ignored_links: Vec<(usize, usize)>,
    obstacles: Arc<Vec<Obstacle<T>>>,
    goals: Vec<PoseGoal<T>>,
    weights: CostWeights<T>,
    collision: CollisionConfig<T>,
    tolerance: GoalTolerance<T>,
    parallel: ParallelConfig,
}

impl<T: Scalar> TrajectoryCostBuilder<T> {
    /// Sets the collision spheres.
    pub fn spheres(mut self, spheres: impl Into<Arc<SphereModel<T>>>) -> Self {
        self.spheres = spheres.into();
        self
    }

    /// Link pairs that never collide, in addition to adjacent links.
    pub fn ignore_link_pairs(mut self, pairs: Vec<(usize, usize)>) -> Self {
        self.ignored_links = pairs;
        self
    }

    /// Sets the obstacles.
    pub fn obstacles(mut self, obstacles: impl Into<Arc<Vec<Obstacle<T>>>>) -> Self {
        self.obstacles = obstacles.into();
        self
    }

    /// Sets one goal per batch slot.
    pub fn goals(mut self, goals: Vec<PoseGoal<T>>) -> Self {
        self.goals = goals;
        self
    }

    /// Sets the cost weights.
    pub fn weights(mut self, weights: CostWeights<T>) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the collision configuration.
    pub fn collision(mut self, collision: CollisionConfig<T>) -> Self {
        self.collision = collision;
        self
    }

    /// Sets the terminal tolerances.
    pub fn tolerance(mut self, tolerance: GoalTolerance<T>) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the waypoint-level parallel thresholds.
    pub fn parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validates every input and builds the cost.
    ///
    /// # Errors
    ///
    /// - [`OptimizerError::EmptyBatch`] without goals
    /// - [`OptimizerError::Model`] for malformed obstacles, goals, weights,
    ///   collision settings, joint limits, or a stepper whose joint count
    ///   differs from the chain's
    pub fn build(self) -> OptimizerResult<TrajectoryCost<T>> {
        if self.goals.is_empty() {
            return Err(OptimizerError::EmptyBatch);
        }
        let dofs = self.chain.num_dofs();
        if self.stepper.num_dofs() != dofs {
            return Err(ModelError::dimension_mismatch(
                format!("{dofs} joints"),
                format!("{} joints in the stepper", self.stepper.num_dofs()),
            )
            .into());
        }
        if self.stepper.start().position.len() != dofs {
            return Err(ModelError::dimension_mismatch(dofs, self.stepper.start().position.len()).into());
        }
        self.chain.limits().validate(dofs)?;
        validate_obstacles(&self.obstacles)?;
        for (slot, goal) in self.goals.iter().enumerate() {
            goal.validate(slot)?;
        }
        self.weights.validate()?;
        self.collision.validate()?;
        self.tolerance.validate()?;

        let pairs = SelfCollisionPairs::build(&self.chain, &self.spheres, &self.ignored_links)?;

        Ok(TrajectoryCost {
            chain: self.chain,
            spheres: self.spheres,
            pairs: Arc::new(pairs),
            obstacles: self.obstacles,
            goals: self.goals,
            stepper: self.stepper,
            weights: self.weights,
            collision: self.collision,
            tolerance: self.tolerance,
            parallel: self.parallel,
        })
    }
}

impl<T: Scalar> TrajectoryCost<T> {
    /// Starts building a cost for `chain`, with trajectories shaped by
    /// `stepper`.
    pub fn builder(chain: impl Into<Arc<KinematicChain<T>>>, stepper: TensorStepper<T>) -> TrajectoryCostBuilder<T> {
        TrajectoryCostBuilder {
            chain: chain.into(),
            stepper,
            spheres: Arc::new(SphereModel::empty()),
            ignored_links: Vec::new(),
            obstacles: Arc::new(Vec::new()),
            goals: Vec::new(),
            weights: CostWeights::default(),
            collision: CollisionConfig::default(),
            tolerance: GoalTolerance::default(),
            parallel: ParallelConfig::default(),
        }
    }

    /// The kinematic chain.
    pub fn chain(&self) -> &KinematicChain<T> {
        &self.chain
    }

    /// The collision spheres.
    pub fn spheres(&self) -> &SphereModel<T> {
        &self.spheres
    }

    /// The checked self-collision pairs.
    pub fn self_collision_pairs(&self) -> &SelfCollisionPairs {
        &self.pairs
    }

    /// The obstacles.
    pub fn obstacles(&self) -> &[Obstacle<T>] {
        &self.obstacles
    }

    /// The goal of each slot.
    pub fn goals(&self) -> &[PoseGoal<T>] {
        &self.goals
    }

    /// The tensor stepper.
    pub fn stepper(&self) -> &TensorStepper<T> {
        &self.stepper
    }

    /// The cost weights.
    pub fn weights(&self) -> &CostWeights<T> {
        &self.weights
    }

    /// The collision configuration.
    pub fn collision_config(&self) -> &CollisionConfig<T> {
        &self.collision
    }

    /// The terminal tolerances.
    pub fn tolerance(&self) -> &GoalTolerance<T> {
        &self.tolerance
    }

    /// Same robot, scene and weights with a different set of goals.
    ///
    /// # Errors
    ///
    /// Fails on an empty or invalid goal list.
    pub fn with_goals(&self, goals: Vec<PoseGoal<T>>) -> OptimizerResult<Self> {
        if goals.is_empty() {
            return Err(OptimizerError::EmptyBatch);
        }
        for (slot, goal) in goals.iter().enumerate() {
            goal.validate(slot)?;
        }
        Ok(Self {
            goals,
            ..self.clone()
        })
    }

    /// Rolls out parameters into a trajectory state.
    pub fn rollout(&self, x: &DVector<T>) -> TrajectoryState<T> {
        self.stepper.rollout(x)
    }

    fn obstacles_enabled(&self) -> bool {
        self.weights.collision > T::zero() && !self.obstacles.is_empty() && !self.spheres.is_empty()
    }

    fn self_collision_enabled(&self) -> bool {
        self.weights.self_collision > T::zero() && !self.pairs.is_empty()
    }

    fn waypoint_cost(
        &self,
        t: usize,
        state: &TrajectoryState<T>,
        goal: &PoseGoal<T>,
        need_gradient: bool,
    ) -> WaypointCost<T> {
        let dofs = self.chain.num_dofs();
        let request = if need_gradient {
            JacobianRequest::AllLinks
        } else {
            JacobianRequest::None
        };
        let kinematics = self.chain.forward_unchecked(&state.position(t), request);
        let mut terms = CostTerms::default();
        let mut gradient = need_gradient.then(|| DVector::zeros(dofs));

        let goal_weight = if t + 1 == state.num_waypoints() {
            T::one()
        } else {
            self.weights.run_weight
        };
        if goal_weight > T::zero() {
            let pose = pose_distance(
                kinematics.end_effector_pose(),
                kinematics.end_effector_jacobian(),
                goal,
                &self.weights.goal,
            );
            terms.goal = goal_weight * pose.cost;
            if let (Some(g), Some(pg)) = (gradient.as_mut(), pose.gradient) {
                g.axpy(goal_weight, &pg, T::one());
            }
        }

        let obstacles = self.obstacles_enabled();
        let self_collision = self.self_collision_enabled();
        if obstacles || self_collision {
            let spheres = self.spheres.sphere_poses(&kinematics);
            if obstacles {
                let contact = obstacle_cost(&spheres, &self.obstacles, &self.collision, dofs, need_gradient);
                terms.collision = self.weights.collision * contact.cost;
                if let (Some(g), Some(cg)) = (gradient.as_mut(), contact.gradient) {
                    g.axpy(self.weights.collision, &cg, T::one());
                }
            }
            if self_collision {
                let contact = self.pairs.cost(&spheres, &self.collision, dofs, need_gradient);
                terms.self_collision = self.weights.self_collision * contact.cost;
                if let (Some(g), Some(cg)) = (gradient.as_mut(), contact.gradient) {
                    g.axpy(self.weights.self_collision, &cg, T::one());
                }
            }
        }

        WaypointCost { terms, gradient }
    }

    fn sphere_poses_at(&self, state: &TrajectoryState<T>, t: usize) -> Vec<SpherePose<T>> {
        let kinematics: KinematicsState<T> = self.chain.forward_unchecked(&state.position(t), JacobianRequest::None);
        self.spheres.sphere_poses(&kinematics)
    }

    /// Position and rotation error of the last waypoint.
    pub fn terminal_errors(&self, slot: usize, x: &DVector<T>) -> (T, T) {
        let state = self.stepper.rollout(x);
        let last = state.num_waypoints() - 1;
        let kinematics = self.chain.forward_unchecked(&state.position(last), JacobianRequest::None);
        let pose = pose_distance(kinematics.end_effector_pose(), None, &self.goals[slot], &self.weights.goal);
        (pose.position_error, pose.rotation_error)
    }

    /// Smallest sphere–obstacle clearance over the free waypoints.
    ///
    /// Infinite when there are no obstacles or no spheres.
    pub fn min_clearance(&self, x: &DVector<T>) -> T {
        let state = self.stepper.rollout(x);
        (1..state.num_waypoints())
            .map(|t| min_clearance(&self.sphere_poses_at(&state, t), &self.obstacles, self.collision.epsilon))
            .fold(<T as Scalar>::from_f64(f64::INFINITY), |acc, d| acc.min(d))
    }

    /// Smallest self-collision distance over the free waypoints.
    ///
    /// Infinite when no pair is checked.
    pub fn min_self_distance(&self, x: &DVector<T>) -> T {
        let state = self.stepper.rollout(x);
        (1..state.num_waypoints())
            .map(|t| self.pairs.min_distance(&self.sphere_poses_at(&state, t)))
            .fold(<T as Scalar>::from_f64(f64::INFINITY), |acc, d| acc.min(d))
    }
}

impl<T: Scalar> CostFunction<T> for TrajectoryCost<T> {
    fn dimension(&self) -> usize {
        self.stepper.dimension()
    }

    fn batch_size(&self) -> usize {
        self.goals.len()
    }

    fn evaluate(&self, slot: usize, x: &DVector<T>, need_gradient: bool) -> CostEvaluation<T> {
        let state = self.stepper.rollout(x);
        let (n, d) = (state.num_waypoints(), self.stepper.num_dofs());
        let goal = &self.goals[slot];

        let waypoints = ParallelBatch::map_indices(n - 1, self.parallel.parallel_waypoints(n), |i| {
            self.waypoint_cost(i + 1, &state, goal, need_gradient)
        });

        let sum = |f: fn(&CostTerms<T>) -> T| {
            let values: Vec<T> = waypoints.iter().map(|w| f(&w.terms)).collect();
            pairwise_sum(&values)
        };
        let mut terms = CostTerms {
            goal: sum(|t| t.goal),
            collision: sum(|t| t.collision),
            self_collision: sum(|t| t.self_collision),
            ..CostTerms::default()
        };

        let mut state_grad = need_gradient.then(|| StateGradient::zeros(n, d));
        if let Some(sg) = state_grad.as_mut() {
            for (i, w) in waypoints.iter().enumerate() {
                if let Some(g) = &w.gradient {
                    sg.positions.row_mut(i + 1).tr_copy_from(g);
                }
            }
        }

        terms.smoothness = smoothness_cost(&state, &self.weights.smoothness, state_grad.as_mut());
        terms.terminal = terminal_cost(&state, &self.weights.smoothness, state_grad.as_mut());
        terms.bounds = bounds_cost(&state, self.chain.limits(), self.weights.bounds, state_grad.as_mut());

        let gradient = state_grad.map(|sg| self.stepper.backprop(&sg));
        CostEvaluation::new(terms.total(), gradient).with_terms(terms)
    }

    /// The last waypoint is within the goal tolerance, and every free
    /// waypoint keeps at least `margin` from obstacles and between checked
    /// sphere pairs, when those costs are enabled.
    fn is_satisfied(&self, slot: usize, x: &DVector<T>) -> bool {
        let (position_error, rotation_error) = self.terminal_errors(slot, x);
        if !(position_error <= self.tolerance.position) {
            return false;
        }
        if self.weights.goal.rotation_weight > T::zero() && !(rotation_error <= self.tolerance.rotation) {
            return false;
        }
        let margin = self.collision.margin;
        if self.obstacles_enabled() && !(self.min_clearance(x) >= margin) {
            return false;
        }
        if self.self_collision_enabled() && !(self.min_self_distance(x) >= margin) {
            return false;
        }
        true
    }

    fn apply_step(&self, x: &DVector<T>, direction: &DVector<T>, alpha: T) -> DVector<T> {
        self.stepper.step(x, direction, alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor_step::{StartState, StepMode, StepperConfig};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use trajopt_kinematics::CollisionSphere;

    fn stepper(mode: StepMode) -> TensorStepper<f64> {
        TensorStepper::new(
            StepperConfig::new(6, 2, 0.2).with_mode(mode),
            StartState::at_rest(DVector::from_vec(vec![0.3, 0.2])),
        )
        .unwrap()
    }

    fn cost(mode: StepMode, parallel: ParallelConfig) -> TrajectoryCost<f64> {
        let chain = KinematicChain::planar_arm(&[1.0, 0.8]).unwrap();
        let spheres = SphereModel::new(
            &chain,
            vec![
                CollisionSphere::new(1, Vector3::new(0.4, 0.0, 0.0), 0.1),
                CollisionSphere::new(2, Vector3::zeros(), 0.08),
            ],
        )
        .unwrap();
        TrajectoryCost::builder(chain, stepper(mode))
            .spheres(spheres)
            .obstacles(vec![Obstacle::sphere(Vector3::new(1.0, 1.0, 0.0), 0.3)])
            .goals(vec![PoseGoal::position(Vector3::new(0.2, 1.5, 0.0))])
            .weights(
                CostWeights::new()
                    .with_goal(PoseCostWeights::new(10.0, 0.5))
                    .with_run_weight(0.1)
                    .with_smoothness(SmoothnessWeights::default().with_derivatives(0.01, 0.001, 1e-4).with_terminal(0.1, 0.01))
                    .with_bounds(1.0),
            )
            .collision(CollisionConfig::new().with_margin(0.02).with_activation_distance(0.1))
            .parallel(parallel)
            .build()
            .unwrap()
    }

    fn sample(cost: &TrajectoryCost<f64>) -> DVector<f64> {
        DVector::from_fn(cost.dimension(), |i, _| 0.3 + 0.15 * (i as f64 * 0.9).sin())
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        for mode in [StepMode::Position, StepMode::Acceleration] {
            let cost = cost(mode, ParallelConfig::sequential());
            let x = sample(&cost);
            let eval = cost.evaluate(0, &x, true);
            assert!(eval.terms.goal > 0.0);
            let analytic = eval.gradient.unwrap();
            let fd = cost.gradient_fd(0, &x, 1e-6);
            for i in 0..x.len() {
                assert_relative_eq!(analytic[i], fd[i], epsilon = 1e-5, max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn test_cost_does_not_depend_on_gradient_request() {
        let cost = cost(StepMode::Position, ParallelConfig::sequential());
        let x = sample(&cost);
        let with = cost.evaluate(0, &x, true);
        let without = cost.evaluate(0, &x, false);
        assert_eq!(with.cost, without.cost);
        assert_eq!(with.terms, without.terms);
        assert!(without.gradient.is_none());
    }

    #[test]
    fn test_parallel_waypoints_are_bit_identical() {
        let sequential = cost(StepMode::Position, ParallelConfig::sequential());
        let parallel = cost(StepMode::Position, ParallelConfig::new().with_min_waypoints(1));
        let x = sample(&sequential);
        let a = sequential.evaluate(0, &x, true);
        let b = parallel.evaluate(0, &x, true);
        assert_eq!(a.cost, b.cost);
        assert_eq!(a.gradient, b.gradient);
    }

    #[test]
    fn test_locked_start_has_zero_gradient() {
        let cost = cost(StepMode::Position, ParallelConfig::sequential());
        let x = sample(&cost);
        let g = cost.evaluate(0, &x, true).gradient.unwrap();
        assert_eq!(g[0], 0.0);
        assert_eq!(g[1], 0.0);

        let stepped = cost.apply_step(&x, &DVector::from_element(x.len(), 1.0), 0.5);
        assert_eq!(stepped[0], x[0]);
        assert_relative_eq!(stepped[2], x[2] + 0.5);
    }

    #[test]
    fn test_terms_sum_to_cost() {
        let cost = cost(StepMode::Position, ParallelConfig::sequential());
        let eval = cost.evaluate(0, &sample(&cost), false);
        assert_eq!(eval.cost, eval.terms.total());
    }

    #[test]
    fn test_build_rejects_bad_inputs() {
        let chain = KinematicChain::<f64>::planar_arm(&[1.0, 0.8]).unwrap();

        let err = TrajectoryCost::builder(chain.clone(), stepper(StepMode::Position)).build();
        assert!(matches!(err, Err(OptimizerError::EmptyBatch)));

        let err = TrajectoryCost::builder(chain.clone(), stepper(StepMode::Position))
            .goals(vec![PoseGoal::position(Vector3::new(f64::NAN, 0.0, 0.0))])
            .build();
        assert!(matches!(err, Err(OptimizerError::Model(_))));

        let err = TrajectoryCost::builder(chain.clone(), stepper(StepMode::Position))
            .goals(vec![PoseGoal::position(Vector3::new(1.0, 0.0, 0.0))])
            .obstacles(vec![Obstacle::sphere(Vector3::zeros(), -1.0)])
            .build();
        assert!(matches!(err, Err(OptimizerError::Model(ModelError::InvalidObstacle { .. }))));

        let three_dofs = TensorStepper::new(
            StepperConfig::new(4, 3, 0.1),
            StartState::at_rest(DVector::zeros(3)),
        )
        .unwrap();
        let err = TrajectoryCost::builder(chain.clone(), three_dofs)
            .goals(vec![PoseGoal::position(Vector3::new(1.0, 0.0, 0.0))])
            .build();
        assert!(matches!(err, Err(OptimizerError::Model(ModelError::DimensionMismatch { .. }))));

        let err = TrajectoryCost::builder(chain, stepper(StepMode::Position))
            .goals(vec![PoseGoal::position(Vector3::new(1.0, 0.0, 0.0))])
            .weights(CostWeights::new().with_bounds(-1.0))
            .build();
        assert!(matches!(err, Err(OptimizerError::Model(ModelError::InvalidParameter { .. }))));
    }

    #[test]
    fn test_is_satisfied_checks_goal_and_clearance() {
        let chain = KinematicChain::<f64>::planar_arm(&[1.0, 0.8]).unwrap();
        let stepper = TensorStepper::new(
            StepperConfig::new(3, 2, 0.1),
            StartState::at_rest(DVector::zeros(2)),
        )
        .unwrap();
        // q = 0 puts the tool at (1.8, 0, 0)
        let cost = TrajectoryCost::builder(chain, stepper)
            .goals(vec![PoseGoal::position(Vector3::new(1.8, 0.0, 0.0))])
            .weights(CostWeights::new().with_goal(PoseCostWeights::position_only(1.0)))
            .build()
            .unwrap();
        let x = DVector::zeros(6);
        assert!(cost.is_satisfied(0, &x));
        let (position_error, _) = cost.terminal_errors(0, &x);
        assert_relative_eq!(position_error, 0.0, epsilon = 1e-12);

        let far = cost.with_goals(vec![PoseGoal::position(Vector3::new(1.0, 1.0, 0.0))]).unwrap();
        assert!(!far.is_satisfied(0, &x));
        assert_eq!(far.min_clearance(&x), f64::INFINITY);
    }
}
