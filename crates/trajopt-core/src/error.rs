//! Error types for trajectory optimization.
//!
//! Two families of errors exist:
//!
//! - [`ModelError`] and [`OptimizerError`] are fatal. They are returned from
//!   constructors and from the optimizer entry point before any iteration
//!   runs, when the robot model, the obstacles, the goals or the configuration
//!   are malformed.
//! - [`Degeneracy`] is non-fatal. It describes a numerical event inside one
//!   batch slot (a clamped denominator, a rejected curvature pair...). It is
//!   counted in the slot diagnostics and never aborts the batch.

use thiserror::Error;

/// Errors raised while validating the robot model and the task inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A link refers to a parent that does not precede it.
    #[error("Invalid link topology at link {link}: {reason}")]
    InvalidTopology {
        /// Index of the offending link
        link: usize,
        /// Description of the problem
        reason: String,
    },

    /// A joint axis is zero or not finite.
    #[error("Invalid joint axis at link {link}")]
    InvalidAxis {
        /// Index of the offending link
        link: usize,
    },

    /// A collision sphere has a negative or non-finite radius.
    #[error("Invalid sphere radius {radius} for sphere {sphere}")]
    InvalidRadius {
        /// Index of the offending sphere
        sphere: usize,
        /// Radius that was supplied
        radius: f64,
    },

    /// An obstacle has a non-positive extent or a non-finite pose.
    #[error("Invalid obstacle {index}: {reason}")]
    InvalidObstacle {
        /// Index of the offending obstacle
        index: usize,
        /// Description of the problem
        reason: String,
    },

    /// Dimension mismatch between inputs.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions
        expected: String,
        /// Actual dimensions
        actual: String,
    },

    /// A parameter is out of its valid range.
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of the problem
        reason: String,
    },
}

impl ModelError {
    /// Create an InvalidTopology error.
    pub fn invalid_topology<S: Into<String>>(link: usize, reason: S) -> Self {
        Self::InvalidTopology {
            link,
            reason: reason.into(),
        }
    }

    /// Create an InvalidObstacle error.
    pub fn invalid_obstacle<S: Into<String>>(index: usize, reason: S) -> Self {
        Self::InvalidObstacle {
            index,
            reason: reason.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter<S: Into<String>>(reason: S) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur when setting up an optimization run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    /// Invalid optimizer configuration.
    ///
    /// This error occurs when the optimizer is configured with invalid
    /// parameters (e.g., zero history size, line-search factor outside (0, 1)).
    #[error("Invalid optimizer configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
    },

    /// The number of seeds, goals or slots does not agree.
    #[error("Batch size mismatch: expected {expected}, got {actual}")]
    BatchSizeMismatch {
        /// Expected batch size
        expected: usize,
        /// Actual batch size
        actual: usize,
    },

    /// The batch is empty.
    #[error("Empty batch: at least one seed is required")]
    EmptyBatch,

    /// Error in the robot model or task inputs.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl OptimizerError {
    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S: Into<String>>(reason: S) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a BatchSizeMismatch error.
    pub fn batch_size_mismatch(expected: usize, actual: usize) -> Self {
        Self::BatchSizeMismatch { expected, actual }
    }
}

/// Non-fatal numerical events inside a single batch slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Degeneracy {
    /// A curvature pair with `sᵀy ≤ 0` (relative to its norms) was dropped.
    NonPositiveCurvature,
    /// The quasi-Newton direction was not a descent direction.
    NonDescentDirection,
    /// A cost evaluation returned a non-finite value.
    NonFiniteCost,
}

impl std::fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NonPositiveCurvature => "non-positive curvature",
            Self::NonDescentDirection => "non-descent direction",
            Self::NonFiniteCost => "non-finite cost",
        };
        f.write_str(name)
    }
}

/// Result type alias for model construction.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Result type alias for optimizer setup.
pub type OptimizerResult<T> = std::result::Result<T, OptimizerError>;
