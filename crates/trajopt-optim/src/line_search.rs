//! Backtracking line search over a geometric sequence of step sizes.
//!
//! Given a point `x`, its cost `f(x)` and gradient `g`, and a descent
//! direction `d`, the search tries the candidates
//!
//! ```text
//! α_k = α₀ · ρ^k,   k = 0 .. max_trials
//! ```
//!
//! and accepts one that satisfies the configured condition:
//!
//! - **Armijo**: `f(x + α d) ≤ f(x) + c₁ α ⟨g, d⟩`
//! - **Wolfe**: Armijo and `⟨g(x + α d), d⟩ ≥ c₂ ⟨g, d⟩`
//! - **Strong Wolfe**: Armijo and `|⟨g(x + α d), d⟩| ≤ c₂ |⟨g, d⟩|`
//!
//! Among the satisfying candidates, [`AcceptancePolicy::LargestStep`] takes the
//! largest α and [`AcceptancePolicy::LowestCost`] the lowest cost, with ties
//! going to the larger α. The round is evaluated either one candidate at a
//! time or all at once in parallel; the acceptance is a reduction over the
//! known candidates, so both modes accept the same step.
//!
//! A candidate whose cost is not finite is treated as infinitely bad and
//! never accepted. When no candidate qualifies, the step is rejected and the
//! slot stays where it is.

use tracing::trace;
use trajopt_core::{
    cost_function::{CostFunction, CostTerms},
    error::{ModelError, Result},
    numerical::sanitize_cost,
    parallel::ParallelBatch,
    types::{DVector, Scalar},
};

/// Acceptance condition for a candidate step.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineSearchCondition<T> {
    /// Sufficient decrease only
    Armijo {
        /// Sufficient decrease constant in (0, 1)
        c1: T,
    },
    /// Sufficient decrease and curvature
    Wolfe {
        /// Sufficient decrease constant
        c1: T,
        /// Curvature constant in (c1, 1)
        c2: T,
    },
    /// Sufficient decrease and two-sided curvature
    StrongWolfe {
        /// Sufficient decrease constant
        c1: T,
        /// Curvature constant in (c1, 1)
        c2: T,
    },
}

impl<T: Scalar> Default for LineSearchCondition<T> {
    fn default() -> Self {
        Self::Armijo {
            c1: <T as Scalar>::from_f64(1e-4),
        }
    }
}

impl<T: Scalar> LineSearchCondition<T> {
    /// Weak Wolfe with `c1 = 1e-4`, `c2 = 0.9`.
    pub fn wolfe() -> Self {
        Self::Wolfe {
            c1: <T as Scalar>::from_f64(1e-4),
            c2: <T as Scalar>::from_f64(0.9),
        }
    }

    /// Strong Wolfe with `c1 = 1e-4`, `c2 = 0.9`.
    pub fn strong_wolfe() -> Self {
        Self::StrongWolfe {
            c1: <T as Scalar>::from_f64(1e-4),
            c2: <T as Scalar>::from_f64(0.9),
        }
    }

    /// Whether the condition needs the gradient at each candidate.
    pub fn needs_gradient(&self) -> bool {
        !matches!(self, Self::Armijo { .. })
    }

    /// Checks the constants.
    pub fn validate(&self) -> Result<()> {
        let in_unit = |c: T| c > T::zero() && c < T::one();
        match *self {
            Self::Armijo { c1 } => {
                if !in_unit(c1) {
                    return Err(ModelError::invalid_parameter("Armijo constant c1 must be in (0, 1)"));
                }
            }
            Self::Wolfe { c1, c2 } | Self::StrongWolfe { c1, c2 } => {
                if !in_unit(c1) {
                    return Err(ModelError::invalid_parameter("Armijo constant c1 must be in (0, 1)"));
                }
                if !(c2 > c1 && c2 < T::one()) {
                    return Err(ModelError::invalid_parameter(
                        "Wolfe constant c2 must satisfy c1 < c2 < 1",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Evaluates the condition.
    ///
    /// `slope` is `⟨g(x), d⟩` and `trial_slope` is `⟨g(x + α d), d⟩` when
    /// available.
    pub fn holds(&self, value: T, slope: T, alpha: T, trial_value: T, trial_slope: Option<T>) -> bool {
        let armijo = |c1: T| trial_value <= value + c1 * alpha * slope;
        match *self {
            Self::Armijo { c1 } => armijo(c1),
            Self::Wolfe { c1, c2 } => {
                armijo(c1) && trial_slope.map_or(false, |ts| ts >= c2 * slope)
            }
            Self::StrongWolfe { c1, c2 } => {
                armijo(c1) && trial_slope.map_or(false, |ts| ts.abs() <= c2 * slope.abs())
            }
        }
    }
}

/// Which satisfying candidate to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AcceptancePolicy {
    /// The largest satisfying step
    #[default]
    LargestStep,
    /// The satisfying step with the lowest cost; ties go to the larger step
    LowestCost,
}

/// How the candidates of one round are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Evaluation {
    /// One candidate at a time, largest first, stopping as early as possible
    #[default]
    Sequential,
    /// Every candidate at once, then a reduction
    Parallel,
}

/// Line search configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSearchConfig<T> {
    /// First candidate α₀
    pub initial_step: T,
    /// Geometric shrink factor ρ in (0, 1)
    pub shrink_factor: T,
    /// Number of candidates per round, shared by every slot
    pub max_trials: usize,
    /// Acceptance condition
    pub condition: LineSearchCondition<T>,
    /// Choice among satisfying candidates
    pub acceptance: AcceptancePolicy,
    /// Candidate evaluation mode
    pub evaluation: Evaluation,
}

impl<T: Scalar> Default for LineSearchConfig<T> {
    fn default() -> Self {
        Self {
            initial_step: T::one(),
            shrink_factor: <T as Scalar>::from_f64(0.5),
            max_trials: 20,
            condition: LineSearchCondition::default(),
            acceptance: AcceptancePolicy::default(),
            evaluation: Evaluation::default(),
        }
    }
}

impl<T: Scalar> LineSearchConfig<T> {
    /// Creates a new configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the first candidate step.
    pub fn with_initial_step(mut self, step: T) -> Self {
        self.initial_step = step;
        self
    }

    /// Sets the shrink factor.
    pub fn with_shrink_factor(mut self, factor: T) -> Self {
        self.shrink_factor = factor;
        self
    }

    /// Sets the number of candidates per round.
    pub fn with_max_trials(mut self, trials: usize) -> Self {
        self.max_trials = trials;
        self
    }

    /// Sets the acceptance condition.
    pub fn with_condition(mut self, condition: LineSearchCondition<T>) -> Self {
        self.condition = condition;
        self
    }

    /// Sets the acceptance policy.
    pub fn with_acceptance(mut self, acceptance: AcceptancePolicy) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// Sets the evaluation mode.
    pub fn with_evaluation(mut self, evaluation: Evaluation) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// The k-th candidate step.
    pub fn candidate(&self, k: usize) -> T {
        let mut alpha = self.initial_step;
        for _ in 0..k {
            alpha *= self.shrink_factor;
        }
        alpha
    }

    /// The last candidate of a round.
    pub fn smallest_step(&self) -> T {
        self.candidate(self.max_trials.saturating_sub(1))
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_step > T::zero()) || !self.initial_step.is_finite() {
            return Err(ModelError::invalid_parameter("Initial step must be positive and finite"));
        }
        if !(self.shrink_factor > T::zero() && self.shrink_factor < T::one()) {
            return Err(ModelError::invalid_parameter("Shrink factor must be in (0, 1)"));
        }
        if self.max_trials == 0 {
            return Err(ModelError::invalid_parameter("Line search needs at least one trial"));
        }
        self.condition.validate()
    }
}

/// Why a round produced no step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RejectReason {
    /// `⟨g, d⟩ ≥ 0`: no candidate was evaluated
    NonDescentDirection,
    /// No candidate satisfied the condition
    BudgetExhausted,
}

/// The accepted candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedStep<T: Scalar> {
    /// Step size
    pub alpha: T,
    /// New parameters
    pub point: DVector<T>,
    /// Cost at `point`
    pub cost: T,
    /// Gradient at `point`, when the condition required it
    pub gradient: Option<DVector<T>>,
    /// Cost breakdown at `point`
    pub terms: CostTerms<T>,
    /// Candidates evaluated
    pub trials: usize,
}

/// Result of one line search round.
#[derive(Debug, Clone, PartialEq)]
pub enum LineSearchOutcome<T: Scalar> {
    /// A step was accepted
    Accepted(AcceptedStep<T>),
    /// The slot keeps its current parameters
    Rejected {
        /// Reason for the rejection
        reason: RejectReason,
        /// Candidates evaluated
        trials: usize,
    },
}

impl<T: Scalar> LineSearchOutcome<T> {
    /// Whether a step was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Candidates evaluated.
    pub fn trials(&self) -> usize {
        match self {
            Self::Accepted(step) => step.trials,
            Self::Rejected { trials, .. } => *trials,
        }
    }
}

#[derive(Debug)]
struct Candidate<T: Scalar> {
    alpha: T,
    point: DVector<T>,
    cost: T,
    gradient: Option<DVector<T>>,
    terms: CostTerms<T>,
    satisfied: bool,
}

/// Backtracking line search for one batch slot.
#[derive(Debug, Clone)]
pub struct BacktrackingLineSearch<T: Scalar> {
    config: LineSearchConfig<T>,
}

impl<T: Scalar> BacktrackingLineSearch<T> {
    /// Creates a line search with the given configuration.
    pub fn new(config: LineSearchConfig<T>) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LineSearchConfig<T> {
        &self.config
    }

    /// Searches along `direction` from `point` for `slot`.
    ///
    /// `parallel` allows the candidates of a [`Evaluation::Parallel`] round to
    /// run on several threads; it has no effect on the result.
    #[allow(clippy::too_many_arguments)]
    pub fn search<C>(
        &self,
        cost_fn: &C,
        slot: usize,
        point: &DVector<T>,
        value: T,
        gradient: &DVector<T>,
        direction: &DVector<T>,
        parallel: bool,
    ) -> LineSearchOutcome<T>
    where
        C: CostFunction<T> + ?Sized,
    {
        let slope = gradient.dot(direction);
        if !(slope < T::zero()) {
            trace!(slot, "line search skipped: direction is not a descent direction");
            return LineSearchOutcome::Rejected {
                reason: RejectReason::NonDescentDirection,
                trials: 0,
            };
        }

        let evaluate = |k: usize| self.try_candidate(cost_fn, slot, point, value, slope, direction, k);

        let chosen = match (self.config.evaluation, self.config.acceptance) {
            (Evaluation::Sequential, AcceptancePolicy::LargestStep) => {
                let mut trials = 0;
                let mut found = None;
                for k in 0..self.config.max_trials {
                    let candidate = evaluate(k);
                    trials += 1;
                    if candidate.satisfied {
                        found = Some(candidate);
                        break;
                    }
                }
                (found, trials)
            }
            (mode, policy) => {
                let candidates = ParallelBatch::map_indices(
                    self.config.max_trials,
                    parallel && mode == Evaluation::Parallel,
                    evaluate,
                );
                let trials = candidates.len();
                (Self::reduce(candidates, policy), trials)
            }
        };

        match chosen {
            (Some(c), trials) => {
                trace!(slot, alpha = %c.alpha, cost = %c.cost, trials, "line search accepted");
                LineSearchOutcome::Accepted(AcceptedStep {
                    alpha: c.alpha,
                    point: c.point,
                    cost: c.cost,
                    gradient: c.gradient,
                    terms: c.terms,
                    trials,
                })
            }
            (None, trials) => {
                trace!(slot, trials, "line search exhausted its budget");
                LineSearchOutcome::Rejected {
                    reason: RejectReason::BudgetExhausted,
                    trials,
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn try_candidate<C>(
        &self,
        cost_fn: &C,
        slot: usize,
        point: &DVector<T>,
        value: T,
        slope: T,
        direction: &DVector<T>,
        k: usize,
    ) -> Candidate<T>
    where
        C: CostFunction<T> + ?Sized,
    {
        let alpha = self.config.candidate(k);
        let needs_gradient = self.config.condition.needs_gradient();
        let trial = cost_fn.apply_step(point, direction, alpha);
        let eval = cost_fn.evaluate(slot, &trial, needs_gradient);
        let cost = sanitize_cost(eval.cost);
        let trial_slope = eval.gradient.as_ref().map(|g| g.dot(direction));
        let satisfied = eval.cost.is_finite()
            && self.config.condition.holds(value, slope, alpha, cost, trial_slope);

        trace!(slot, k, alpha = %alpha, cost = %cost, satisfied, "line search candidate");

        Candidate {
            alpha,
            point: trial,
            cost,
            gradient: eval.gradient,
            terms: eval.terms,
            satisfied,
        }
    }

    /// Candidates are in decreasing α order.
    fn reduce(candidates: Vec<Candidate<T>>, policy: AcceptancePolicy) -> Option<Candidate<T>> {
        let mut satisfying = candidates.into_iter().filter(|c| c.satisfied);
        match policy {
            AcceptancePolicy::LargestStep => satisfying.next(),
            AcceptancePolicy::LowestCost => satisfying.fold(None, |best: Option<Candidate<T>>, c| match best {
                Some(b) if b.cost <= c.cost => Some(b),
                _ => Some(c),
            }),
        }
    }
}
