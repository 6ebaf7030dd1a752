//! Configuration of the batch optimizer.

use crate::{best::ImprovementThreshold, lbfgs::LbfgsConfig, line_search::LineSearchConfig};
use std::time::Duration;
use trajopt_core::{
    error::{OptimizerError, OptimizerResult},
    parallel::ParallelConfig,
    types::Scalar,
};

/// Outer-loop configuration shared by every slot of a batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizerConfig<T> {
    /// Outer iteration budget
    pub max_iterations: usize,
    /// L-BFGS direction settings
    pub lbfgs: LbfgsConfig<T>,
    /// Line search settings
    pub line_search: LineSearchConfig<T>,
    /// Decrease required to update the best solution
    pub improvement: ImprovementThreshold<T>,
    /// Relative cost decrease below which an iteration counts as stalled
    pub cost_tolerance: T,
    /// Gradient norm below which a slot is stationary
    pub gradient_tolerance: T,
    /// Consecutive stalled iterations before a satisfied slot converges
    pub patience: usize,
    /// Consecutive rejected line searches before a slot gives up
    pub max_consecutive_rejections: usize,
    /// Wall-clock budget for the whole batch
    pub max_time: Option<Duration>,
    /// Record per-iteration cost and best-cost traces
    pub record_trace: bool,
    /// Parallel execution thresholds
    pub parallel: ParallelConfig,
}

impl<T: Scalar> Default for OptimizerConfig<T> {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            lbfgs: LbfgsConfig::default(),
            line_search: LineSearchConfig::default(),
            improvement: ImprovementThreshold::default(),
            cost_tolerance: <T as Scalar>::from_f64(1e-8),
            gradient_tolerance: T::DEFAULT_GRADIENT_TOLERANCE,
            patience: 3,
            max_consecutive_rejections: 3,
            max_time: None,
            record_trace: false,
            parallel: ParallelConfig::default(),
        }
    }
}

impl<T: Scalar> OptimizerConfig<T> {
    /// Creates a new configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the L-BFGS configuration.
    pub fn with_lbfgs(mut self, lbfgs: LbfgsConfig<T>) -> Self {
        self.lbfgs = lbfgs;
        self
    }

    /// Sets the L-BFGS memory size.
    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.lbfgs.memory_size = memory_size;
        self
    }

    /// Sets the line search configuration.
    pub fn with_line_search(mut self, line_search: LineSearchConfig<T>) -> Self {
        self.line_search = line_search;
        self
    }

    /// Sets the improvement threshold of the best tracker.
    pub fn with_improvement(mut self, improvement: ImprovementThreshold<T>) -> Self {
        self.improvement = improvement;
        self
    }

    /// Sets the cost tolerance.
    pub fn with_cost_tolerance(mut self, tolerance: T) -> Self {
        self.cost_tolerance = tolerance;
        self
    }

    /// Sets the gradient tolerance.
    pub fn with_gradient_tolerance(mut self, tolerance: T) -> Self {
        self.gradient_tolerance = tolerance;
        self
    }

    /// Sets the number of stalled iterations tolerated before convergence.
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Sets the number of consecutive rejected line searches tolerated.
    pub fn with_max_consecutive_rejections(mut self, rejections: usize) -> Self {
        self.max_consecutive_rejections = rejections;
        self
    }

    /// Sets a wall-clock budget.
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Enables or disables trace recording.
    pub fn with_trace(mut self, record: bool) -> Self {
        self.record_trace = record;
        self
    }

    /// Sets the parallel thresholds.
    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Checks the whole configuration.
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.max_iterations == 0 {
            return Err(OptimizerError::invalid_configuration(
                "max_iterations must be at least 1",
            ));
        }
        self.lbfgs
            .validate()
            .map_err(|e| OptimizerError::invalid_configuration(e.to_string()))?;
        self.line_search
            .validate()
            .map_err(|e| OptimizerError::invalid_configuration(e.to_string()))?;
        self.improvement
            .validate()
            .map_err(|e| OptimizerError::invalid_configuration(e.to_string()))?;
        if !(self.cost_tolerance >= T::zero()) || !self.cost_tolerance.is_finite() {
            return Err(OptimizerError::invalid_configuration(
                "cost_tolerance must be finite and non-negative",
            ));
        }
        if !(self.gradient_tolerance >= T::zero()) || !self.gradient_tolerance.is_finite() {
            return Err(OptimizerError::invalid_configuration(
                "gradient_tolerance must be finite and non-negative",
            ));
        }
        if self.patience == 0 {
            return Err(OptimizerError::invalid_configuration("patience must be at least 1"));
        }
        if self.max_consecutive_rejections == 0 {
            return Err(OptimizerError::invalid_configuration(
                "max_consecutive_rejections must be at least 1",
            ));
        }
        Ok(())
    }
}
