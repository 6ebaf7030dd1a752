//! Per-slot and batch results.

use crate::tensor_step::TrajectoryState;
use std::time::Duration;
use trajopt_core::{
    cost_function::CostTerms,
    types::{DVector, Scalar},
};

/// Terminal status of one batch slot.
///
/// # Statuses
/// - **Converged**: progress stalled or the gradient vanished, and the task
///   check holds at the best parameters
/// - **BudgetExhausted**: the iteration budget ran out first
/// - **NoValidStep**: the line search kept failing away from a stationary point
/// - **Cancelled**: the run was cancelled or timed out while the slot was active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotStatus {
    /// The slot met its convergence criteria
    Converged,
    /// The iteration budget ran out
    BudgetExhausted,
    /// The line search found no acceptable step
    NoValidStep,
    /// Cancellation or the wall-clock budget stopped the slot
    Cancelled,
}

impl SlotStatus {
    /// Whether the slot converged.
    pub fn is_converged(self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Converged => "converged",
            Self::BudgetExhausted => "budget exhausted",
            Self::NoValidStep => "no valid step",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Counters of non-fatal events in one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotDiagnostics {
    /// Cost evaluations, line-search candidates included
    pub evaluations: usize,
    /// Rejected line searches
    pub line_search_rejections: usize,
    /// Curvature pairs rejected by the L-BFGS guard
    pub rejected_pairs: usize,
    /// Steepest-descent fallbacks of the L-BFGS direction
    pub direction_fallbacks: usize,
    /// Non-finite costs seen
    pub non_finite_costs: usize,
}

/// Result of one batch slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotResult<T: Scalar> {
    /// Best parameters found
    pub params: DVector<T>,
    /// Rollout of the best parameters, when available
    pub trajectory: Option<TrajectoryState<T>>,
    /// Best cost
    pub cost: T,
    /// Cost breakdown at the best parameters
    pub terms: CostTerms<T>,
    /// Terminal status
    pub status: SlotStatus,
    /// Outer iterations the slot took part in
    pub iterations: usize,
    /// Improvements of the best solution
    pub improvements: usize,
    /// Event counters
    pub diagnostics: SlotDiagnostics,
    /// Current cost after each iteration (when recording traces)
    pub cost_trace: Vec<T>,
    /// Best cost after each iteration (when recording traces)
    pub best_trace: Vec<T>,
}

impl<T: Scalar> SlotResult<T> {
    /// Whether the slot converged.
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }
}

/// Result of a whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T: Scalar> {
    /// One result per slot, in slot order
    pub slots: Vec<SlotResult<T>>,
    /// Outer iterations run
    pub iterations: usize,
    /// Wall-clock time
    pub duration: Duration,
}

impl<T: Scalar> BatchResult<T> {
    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots with the given status.
    pub fn count(&self, status: SlotStatus) -> usize {
        self.slots.iter().filter(|s| s.status == status).count()
    }

    /// Converged slot with the lowest cost.
    pub fn best_converged(&self) -> Option<(usize, &SlotResult<T>)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.converged())
            .min_by(|(_, a), (_, b)| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(cost: f64, status: SlotStatus) -> SlotResult<f64> {
        SlotResult {
            params: DVector::zeros(2),
            trajectory: None,
            cost,
            terms: CostTerms::default(),
            status,
            iterations: 1,
            improvements: 0,
            diagnostics: SlotDiagnostics::default(),
            cost_trace: Vec::new(),
            best_trace: Vec::new(),
        }
    }

    #[test]
    fn test_batch_helpers() {
        let batch = BatchResult {
            slots: vec![
                slot(3.0, SlotStatus::Converged),
                slot(1.0, SlotStatus::BudgetExhausted),
                slot(2.0, SlotStatus::Converged),
            ],
            iterations: 10,
            duration: Duration::from_millis(5),
        };
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.count(SlotStatus::Converged), 2);
        assert_eq!(batch.best_converged().map(|(i, _)| i), Some(2));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SlotStatus::NoValidStep.to_string(), "no valid step");
        assert!(SlotStatus::Converged.is_converged());
        assert!(!SlotStatus::Cancelled.is_converged());
    }
}
