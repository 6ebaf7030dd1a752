//! Best-solution tracking per batch slot.
//!
//! The tracker holds the lowest cost seen so far and the parameters that
//! produced it. It only moves on a strict improvement, so its cost is
//! non-increasing over the run and it is the authoritative result whatever
//! state the slot ends in.

use trajopt_core::{
    error::{ModelError, Result},
    types::{DVector, Scalar},
};

/// How much lower a cost must be to count as an improvement.
///
/// A candidate replaces the best when
/// `cost < best − max(absolute, relative·|best|)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImprovementThreshold<T> {
    /// Absolute decrease
    pub absolute: T,
    /// Decrease relative to the current best
    pub relative: T,
}

impl<T: Scalar> Default for ImprovementThreshold<T> {
    fn default() -> Self {
        Self::strict()
    }
}

impl<T: Scalar> ImprovementThreshold<T> {
    /// Any strictly lower cost improves.
    pub fn strict() -> Self {
        Self {
            absolute: T::zero(),
            relative: T::zero(),
        }
    }

    /// Creates a threshold.
    pub fn new(absolute: T, relative: T) -> Self {
        Self { absolute, relative }
    }

    /// Required decrease below `best`.
    pub fn margin(&self, best: T) -> T {
        self.absolute.max(self.relative * best.abs())
    }

    /// Checks that both components are finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let ok = |v: T| v.is_finite() && v >= T::zero();
        if ok(self.absolute) && ok(self.relative) {
            Ok(())
        } else {
            Err(ModelError::invalid_parameter(
                "improvement thresholds must be finite and non-negative",
            ))
        }
    }
}

/// Lowest-cost parameters of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct BestSolution<T: Scalar> {
    cost: T,
    params: DVector<T>,
    iteration: usize,
    improvements: usize,
}

impl<T: Scalar> BestSolution<T> {
    /// Starts tracking from the seed.
    ///
    /// A non-finite seed cost is stored as `+∞`, so any finite cost improves
    /// on it.
    pub fn new(cost: T, params: DVector<T>) -> Self {
        let cost = if cost.is_finite() {
            cost
        } else {
            <T as Scalar>::from_f64(f64::INFINITY)
        };
        Self {
            cost,
            params,
            iteration: 0,
            improvements: 0,
        }
    }

    /// Lowest cost seen.
    pub fn cost(&self) -> T {
        self.cost
    }

    /// Parameters at the lowest cost.
    pub fn params(&self) -> &DVector<T> {
        &self.params
    }

    /// Iteration at which the best was found (0 for the seed).
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Number of accepted improvements.
    pub fn improvements(&self) -> usize {
        self.improvements
    }

    /// Offers a candidate. Returns whether it replaced the best.
    pub fn offer(
        &mut self,
        cost: T,
        params: &DVector<T>,
        iteration: usize,
        threshold: &ImprovementThreshold<T>,
    ) -> bool {
        if !cost.is_finite() {
            return false;
        }
        let improves = if self.cost.is_finite() {
            cost < self.cost - threshold.margin(self.cost)
        } else {
            true
        };
        if improves {
            self.cost = cost;
            self.params.copy_from(params);
            self.iteration = iteration;
            self.improvements += 1;
        }
        improves
    }

    /// Consumes the tracker and returns the best parameters.
    pub fn into_params(self) -> DVector<T> {
        self.params
    }
}
