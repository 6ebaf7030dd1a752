//! Batched trajectory optimization for kinematic chains.
//!
//! `trajopt` plans joint-space trajectories for a batch of goals (or a batch
//! of seeds towards one goal) at once. Each batch slot is an independent
//! L-BFGS problem over a tensor of waypoints; the cost combines a pose goal,
//! sphere-based obstacle and self-collision penalties, smoothness, and joint
//! limits, all differentiated analytically through fused forward kinematics.
//!
//! This crate re-exports the workspace crates:
//!
//! - [`trajopt_core`]: scalar trait, errors, cost-function interface, parallel helpers
//! - [`trajopt_kinematics`]: kinematic chains, fused kinematics, sphere models
//! - [`trajopt_geometry`]: obstacles, collision and pose-distance costs
//! - [`trajopt_optim`]: tensor stepper, trajectory cost, L-BFGS, line search, batch loop
//!
//! # Example
//!
//! ```rust
//! use trajopt::prelude::*;
//!
//! let chain = KinematicChain::planar_arm(&[1.0, 0.8]).unwrap();
//! let stepper = TensorStepper::new(
//!     StepperConfig::new(8, 2, 0.1),
//!     StartState::at_rest(DVector::zeros(2)),
//! )
//! .unwrap();
//! let cost = TrajectoryCost::builder(chain, stepper)
//!     .goals(vec![PoseGoal::position(Vector3::new(0.5, 1.5, 0.0))])
//!     .weights(CostWeights::new().with_goal(PoseCostWeights::position_only(100.0)))
//!     .build()
//!     .unwrap();
//!
//! let seed = linear_seed(&DVector::zeros(2), &DVector::from_vec(vec![1.0, 0.5]), 8).unwrap();
//! let result = BatchOptimizer::new(OptimizerConfig::new()).plan(&cost, &[seed]).unwrap();
//! assert_eq!(result.len(), 1);
//! ```

pub use nalgebra;
pub use trajopt_core;
pub use trajopt_geometry;
pub use trajopt_kinematics;
pub use trajopt_optim;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use nalgebra::{Isometry3, UnitQuaternion, Vector3};
    pub use trajopt_core::{
        cost_function::{CostFunction, CostTerms},
        error::{ModelError, OptimizerError},
        parallel::ParallelConfig,
        types::{DMatrix, DVector, Scalar},
    };
    pub use trajopt_geometry::{
        CollisionConfig, Obb, Obstacle, PenaltyShape, PoseCostWeights, PoseGoal,
    };
    pub use trajopt_kinematics::{
        CollisionSphere, JacobianRequest, JointLimits, KinematicChain, LinkSpec, SphereModel,
    };
    pub use trajopt_optim::{
        linear_seed, perturbed_seeds, BatchOptimizer, BatchResult, CancellationToken, CostWeights,
        GoalTolerance, LineSearchConfig, OptimizerConfig, SlotResult, SlotStatus,
        SmoothnessWeights, StartState, StepMode, StepperConfig, TensorStepper, TrajectoryCost,
    };
}
