//! Batched L-BFGS trajectory optimization.
//!
//! This crate turns the kinematics and geometry crates into a planner: the
//! [`TensorStepper`] maps optimization variables to full trajectories, the
//! [`TrajectoryCost`] aggregates goal, collision, smoothness and joint-limit
//! terms, and the [`BatchOptimizer`] runs one L-BFGS problem per batch slot.
//!
//! # Modules
//!
//! - [`tensor_step`]: Parameterization, rollout and gradient backpropagation
//! - [`smoothness`] / [`bounds`]: Trajectory-level cost terms
//! - [`cost`]: The aggregated trajectory cost
//! - [`lbfgs`]: Per-slot curvature history and two-loop direction
//! - [`line_search`]: Backtracking line search over a shared trial budget
//! - [`best`]: Best-solution tracking
//! - [`optimizer`]: The outer batch loop
//!
//! # Examples
//!
//! ```rust
//! use trajopt_optim::{BatchOptimizer, OptimizerConfig, SlotStatus};
//! use trajopt_core::{cost_function::QuadraticCost, types::DVector};
//!
//! let cost = QuadraticCost::<f64>::simple(3, 2);
//! let seeds = vec![DVector::from_element(3, 1.0); 2];
//! let optimizer = BatchOptimizer::new(OptimizerConfig::new().with_max_iterations(50));
//! let result = optimizer.optimize(&cost, seeds).unwrap();
//! assert_eq!(result.count(SlotStatus::Converged), 2);
//! ```

pub mod best;
pub mod bounds;
pub mod config;
pub mod cost;
pub mod lbfgs;
pub mod line_search;
pub mod optimizer;
pub mod result;
pub mod seeds;
pub mod smoothness;
pub mod tensor_step;

pub use best::{BestSolution, ImprovementThreshold};
pub use config::OptimizerConfig;
pub use cost::{CostWeights, GoalTolerance, TrajectoryCost, TrajectoryCostBuilder};
pub use lbfgs::{Direction, DirectionKind, LbfgsConfig, LbfgsHistory, LbfgsPhase, PairUpdate};
pub use line_search::{
    AcceptancePolicy, BacktrackingLineSearch, Evaluation, LineSearchCondition, LineSearchConfig,
    LineSearchOutcome, RejectReason,
};
pub use optimizer::{BatchOptimizer, CancellationToken};
pub use result::{BatchResult, SlotDiagnostics, SlotResult, SlotStatus};
pub use seeds::perturbed_seeds;
pub use smoothness::SmoothnessWeights;
pub use tensor_step::{
    linear_seed, StartState, StepMode, StepperConfig, TensorStepper, TrajectoryState,
};
