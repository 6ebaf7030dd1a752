//! Core traits and types for batched trajectory optimization.
//!
//! This crate provides the foundations shared by the kinematics, geometry and
//! optimizer crates: the numeric [`Scalar`](types::Scalar) trait, the error
//! taxonomy, the batched [`CostFunction`](cost_function::CostFunction)
//! interface, numerical-stability helpers and the deterministic parallel
//! reduction used for every accumulation.
//!
//! # Modules
//!
//! - [`cost_function`]: Batched cost function interface and test costs
//! - [`error`]: Fatal error types and non-fatal degeneracy events
//! - [`numerical`]: Guarded divisions and normalizations
//! - [`parallel`]: Parallel configuration, ordered batch maps, pairwise sums
//! - [`types`]: Scalar trait, type aliases and numerical constants

pub mod cost_function;
pub mod error;
pub mod numerical;
pub mod parallel;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{Degeneracy, ModelError, OptimizerError, OptimizerResult, Result};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use trajopt_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cost_function::{
        CostEvaluation, CostFunction, CostTerms, CountingCostFunction, DerivativeChecker,
        QuadraticCost,
    };
    pub use crate::error::{Degeneracy, ModelError, OptimizerError, OptimizerResult, Result};
    pub use crate::parallel::{pairwise_sum, pairwise_sum_vectors, ParallelBatch, ParallelConfig};
    pub use crate::types::{constants, DMatrix, DVector, Scalar, SMatrix, SVector};
}
