//! Batched L-BFGS optimization loop.
//!
//! [`BatchOptimizer`] runs B independent problems in lockstep. The batch is an
//! arena of slots indexed `0..B`; each slot owns its parameters, current cost
//! and gradient, L-BFGS history, best-solution tracker and counters. One outer
//! iteration updates every active slot exactly once:
//!
//! ```text
//! for each active slot (in parallel):
//!     history.update(x, g)           // store (s, y) if the curvature is positive
//!     d = history.direction(g)       // two-loop recursion or steepest descent
//!     line search along d            // shared trial budget
//!     accepted -> x, f, g move; best.offer(f, x); check convergence
//!     rejected -> history.reset(); x stays; idle if numerically stationary,
//!                 NoValidStep after repeated rejections otherwise
//! ```
//!
//! Slots never read each other's state, so a slot's trajectory of iterates is
//! the same whatever else shares the batch. Failures (a rejected line search,
//! a degenerate curvature pair, a non-finite cost) stay inside their slot.
//!
//! Cancellation and the optional wall-clock budget are checked at the top of
//! every iteration. Every result is read from the best-solution tracker.

use crate::{
    best::BestSolution,
    config::OptimizerConfig,
    cost::TrajectoryCost,
    lbfgs::{LbfgsHistory, PairUpdate},
    line_search::{BacktrackingLineSearch, LineSearchOutcome},
    result::{BatchResult, SlotDiagnostics, SlotResult, SlotStatus},
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use tracing::{debug, info, warn};
use trajopt_core::{
    cost_function::{CostFunction, CostTerms},
    error::{ModelError, OptimizerError, OptimizerResult},
    numerical::all_finite,
    parallel::ParallelBatch,
    types::{DMatrix, DVector, Scalar},
};

/// Rounding error of an aggregated cost, in units of machine epsilon times
/// its magnitude.
const COST_RESOLUTION_ULPS: f64 = 1e4;

/// Shared flag to stop a running optimization.
///
/// Clones share the flag. The optimizer checks it once per outer iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Slot<T: Scalar> {
    index: usize,
    point: DVector<T>,
    value: T,
    gradient: DVector<T>,
    history: LbfgsHistory<T>,
    best: BestSolution<T>,
    best_terms: CostTerms<T>,
    status: Option<SlotStatus>,
    idle: bool,
    iterations: usize,
    stalled: usize,
    consecutive_rejections: usize,
    diagnostics: SlotDiagnostics,
    cost_trace: Vec<T>,
    best_trace: Vec<T>,
}

impl<T: Scalar> Slot<T> {
    fn is_active(&self) -> bool {
        self.status.is_none()
    }

    fn is_working(&self) -> bool {
        self.is_active() && !self.idle
    }

    fn finish(&mut self, status: SlotStatus) {
        self.status = Some(status);
    }
}

/// Batched L-BFGS optimizer.
#[derive(Debug, Clone)]
pub struct BatchOptimizer<T: Scalar> {
    config: OptimizerConfig<T>,
}

impl<T: Scalar> BatchOptimizer<T> {
    /// Creates an optimizer. The configuration is validated when a run starts.
    pub fn new(config: OptimizerConfig<T>) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OptimizerConfig<T> {
        &self.config
    }

    /// Optimizes one seed per slot of `cost`.
    ///
    /// # Errors
    ///
    /// Fails before the first iteration on an invalid configuration, an empty
    /// batch, a seed count different from the batch size, or a seed of the
    /// wrong length or with non-finite entries.
    pub fn optimize<C>(&self, cost: &C, seeds: Vec<DVector<T>>) -> OptimizerResult<BatchResult<T>>
    where
        C: CostFunction<T> + ?Sized,
    {
        self.optimize_with_cancel(cost, seeds, &CancellationToken::new())
    }

    /// Like [`optimize`](Self::optimize), stopping early once `cancel` is set.
    pub fn optimize_with_cancel<C>(
        &self,
        cost: &C,
        seeds: Vec<DVector<T>>,
        cancel: &CancellationToken,
    ) -> OptimizerResult<BatchResult<T>>
    where
        C: CostFunction<T> + ?Sized,
    {
        self.validate_inputs(cost, &seeds)?;
        let start = Instant::now();
        let config = &self.config;
        let batch = seeds.len();
        let parallel = config.parallel.parallel_slots(batch);

        info!(
            batch,
            dimension = cost.dimension(),
            max_iterations = config.max_iterations,
            memory = config.lbfgs.memory_size,
            "starting batch optimization"
        );

        let mut slots: Vec<Slot<T>> = ParallelBatch::map(&seeds, parallel, |index, seed| self.init_slot(cost, index, seed));
        let line_search = BacktrackingLineSearch::new(config.line_search);

        let mut iterations = 0;
        for iteration in 1..=config.max_iterations {
            let timed_out = config.max_time.is_some_and(|limit| start.elapsed() >= limit);
            if cancel.is_cancelled() || timed_out {
                let mut cancelled = 0;
                for slot in slots.iter_mut().filter(|s| s.is_active()) {
                    slot.finish(SlotStatus::Cancelled);
                    cancelled += 1;
                }
                info!(iteration, cancelled, timed_out, "optimization stopped early");
                break;
            }
            if !slots.iter().any(Slot::is_working) {
                break;
            }

            iterations = iteration;
            ParallelBatch::for_each_mut(&mut slots, parallel, |_, slot| {
                if slot.is_working() {
                    self.step_slot(cost, &line_search, slot, iteration);
                }
            });

            let active = slots.iter().filter(|s| s.is_active()).count();
            let best = slots
                .iter()
                .map(|s| s.best.cost())
                .fold(<T as Scalar>::from_f64(f64::INFINITY), |acc, c| acc.min(c));
            debug!(iteration, active, best_cost = %best, "iteration complete");
        }

        for slot in slots.iter_mut().filter(|s| s.is_active()) {
            slot.finish(SlotStatus::BudgetExhausted);
        }

        let results: Vec<SlotResult<T>> = slots.into_iter().map(Self::into_result).collect();
        let duration = start.elapsed();
        info!(
            iterations,
            converged = results.iter().filter(|r| r.converged()).count(),
            batch,
            ?duration,
            "batch optimization finished"
        );

        Ok(BatchResult {
            slots: results,
            iterations,
            duration,
        })
    }

    /// Optimizes trajectories given as `[T, D]` position seeds, one per slot.
    ///
    /// Each result carries the rollout of its best parameters.
    pub fn plan(&self, cost: &TrajectoryCost<T>, seeds: &[DMatrix<T>]) -> OptimizerResult<BatchResult<T>> {
        self.plan_with_cancel(cost, seeds, &CancellationToken::new())
    }

    /// Like [`plan`](Self::plan), stopping early once `cancel` is set.
    pub fn plan_with_cancel(
        &self,
        cost: &TrajectoryCost<T>,
        seeds: &[DMatrix<T>],
        cancel: &CancellationToken,
    ) -> OptimizerResult<BatchResult<T>> {
        let params = seeds
            .iter()
            .map(|seed| cost.stepper().params_from_positions(seed))
            .collect::<Result<Vec<_>, ModelError>>()?;
        let mut result = self.optimize_with_cancel(cost, params, cancel)?;
        for slot in &mut result.slots {
            slot.trajectory = Some(cost.rollout(&slot.params));
        }
        Ok(result)
    }

    fn validate_inputs<C>(&self, cost: &C, seeds: &[DVector<T>]) -> OptimizerResult<()>
    where
        C: CostFunction<T> + ?Sized,
    {
        self.config.validate()?;
        if seeds.is_empty() {
            return Err(OptimizerError::EmptyBatch);
        }
        if seeds.len() != cost.batch_size() {
            return Err(OptimizerError::batch_size_mismatch(cost.batch_size(), seeds.len()));
        }
        for seed in seeds {
            if seed.len() != cost.dimension() {
                return Err(ModelError::dimension_mismatch(cost.dimension(), seed.len()).into());
            }
            if !all_finite(seed) {
                return Err(ModelError::invalid_parameter("seed contains non-finite values").into());
            }
        }
        Ok(())
    }

    fn init_slot<C>(&self, cost: &C, index: usize, seed: &DVector<T>) -> Slot<T>
    where
        C: CostFunction<T> + ?Sized,
    {
        let eval = cost.evaluate(index, seed, true);
        let gradient = eval.gradient.unwrap_or_else(|| DVector::zeros(seed.len()));
        let mut slot = Slot {
            index,
            point: seed.clone(),
            value: eval.cost,
            gradient,
            history: LbfgsHistory::new(self.config.lbfgs.memory_size),
            best: BestSolution::new(eval.cost, seed.clone()),
            best_terms: eval.terms,
            status: None,
            idle: false,
            iterations: 0,
            stalled: 0,
            consecutive_rejections: 0,
            diagnostics: SlotDiagnostics {
                evaluations: 1,
                ..SlotDiagnostics::default()
            },
            cost_trace: Vec::new(),
            best_trace: Vec::new(),
        };

        if !eval.cost.is_finite() || !all_finite(&slot.gradient) {
            slot.diagnostics.non_finite_costs += 1;
            slot.finish(SlotStatus::NoValidStep);
            warn!(slot = index, "seed has a non-finite cost or gradient");
        }
        slot
    }

    fn step_slot<C>(&self, cost: &C, line_search: &BacktrackingLineSearch<T>, slot: &mut Slot<T>, iteration: usize)
    where
        C: CostFunction<T> + ?Sized,
    {
        let config = &self.config;
        slot.iterations += 1;

        if let PairUpdate::Rejected(reason) = slot.history.update(&slot.point, &slot.gradient, &config.lbfgs) {
            slot.diagnostics.rejected_pairs += 1;
            debug!(slot = slot.index, %reason, "curvature pair rejected");
        }
        let direction = slot.history.direction(&slot.gradient, &config.lbfgs);
        if direction.is_fallback() {
            slot.diagnostics.direction_fallbacks += 1;
        }

        let outcome = line_search.search(
            cost,
            slot.index,
            &slot.point,
            slot.value,
            &slot.gradient,
            &direction.vector,
            true,
        );
        slot.diagnostics.evaluations += outcome.trials();

        let accepted = match outcome {
            LineSearchOutcome::Accepted(mut step) => {
                let gradient = match step.gradient.take() {
                    Some(g) => g,
                    None => {
                        slot.diagnostics.evaluations += 1;
                        cost.evaluate(slot.index, &step.point, true)
                            .gradient
                            .unwrap_or_else(|| DVector::zeros(step.point.len()))
                    }
                };
                if all_finite(&gradient) {
                    Some((step, gradient))
                } else {
                    slot.diagnostics.non_finite_costs += 1;
                    None
                }
            }
            LineSearchOutcome::Rejected { .. } => None,
        };

        match accepted {
            Some((step, gradient)) => {
                let previous = slot.value;
                slot.point = step.point;
                slot.value = step.cost;
                slot.gradient = gradient;
                slot.consecutive_rejections = 0;
                if slot.best.offer(slot.value, &slot.point, iteration, &config.improvement) {
                    slot.best_terms = step.terms;
                }

                let scale = T::one().max(slot.value.abs());
                if previous - slot.value <= config.cost_tolerance * scale {
                    slot.stalled += 1;
                } else {
                    slot.stalled = 0;
                }
                let stationary = slot.gradient.norm() <= config.gradient_tolerance;
                if (slot.stalled >= config.patience || stationary) && cost.is_satisfied(slot.index, slot.best.params()) {
                    slot.finish(SlotStatus::Converged);
                }
            }
            None => {
                slot.diagnostics.line_search_rejections += 1;
                slot.history.reset();
                if cost.is_satisfied(slot.index, slot.best.params()) {
                    slot.finish(SlotStatus::Converged);
                } else if slot.gradient.norm() <= config.gradient_tolerance
                    || self.below_resolution(slot, &direction.vector)
                {
                    slot.idle = true;
                    debug!(slot = slot.index, iteration, "stationary but unsatisfied; idling");
                } else {
                    slot.consecutive_rejections += 1;
                    if slot.consecutive_rejections >= config.max_consecutive_rejections {
                        slot.finish(SlotStatus::NoValidStep);
                        warn!(
                            slot = slot.index,
                            iteration,
                            gradient_norm = %slot.gradient.norm(),
                            "no valid step found"
                        );
                    }
                }
            }
        }

        if config.record_trace {
            slot.cost_trace.push(slot.value);
            slot.best_trace.push(slot.best.cost());
        }
    }

    /// Whether the smallest line-search step along `direction` predicts a
    /// decrease within the rounding error of the slot's cost.
    fn below_resolution(&self, slot: &Slot<T>, direction: &DVector<T>) -> bool {
        let predicted = self.config.line_search.smallest_step() * slot.gradient.dot(direction).abs();
        let resolution = <T as Scalar>::from_f64(COST_RESOLUTION_ULPS) * T::EPSILON * T::one().max(slot.value.abs());
        predicted <= resolution
    }

    fn into_result(slot: Slot<T>) -> SlotResult<T> {
        let improvements = slot.best.improvements();
        let cost = slot.best.cost();
        SlotResult {
            params: slot.best.into_params(),
            trajectory: None,
            cost,
            terms: slot.best_terms,
            status: slot.status.unwrap_or(SlotStatus::BudgetExhausted),
            iterations: slot.iterations,
            improvements,
            diagnostics: slot.diagnostics,
            cost_trace: slot.cost_trace,
            best_trace: slot.best_trace,
        }
    }
}
