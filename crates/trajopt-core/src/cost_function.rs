//! Cost function interface for batched optimization.
//!
//! A [`CostFunction`] describes B independent problems that share the same
//! parameter dimension. Each problem is addressed by its batch slot index.
//! Evaluation is infallible: configuration errors are caught when the cost is
//! constructed, and numerical trouble inside an evaluation surfaces as a
//! non-finite cost, which the line search treats as a failed trial.
//!
//! # Example
//!
//! ```
//! use trajopt_core::prelude::*;
//! use nalgebra::DVector;
//!
//! // Two slots of f(x) = 0.5 * ||x - c||^2 with different centers
//! let centers = vec![DVector::from_vec(vec![1.0, 0.0]), DVector::from_vec(vec![0.0, 2.0])];
//! let cost = QuadraticCost::<f64>::centered(centers);
//!
//! let x = DVector::zeros(2);
//! let eval = cost.evaluate(1, &x, true);
//! assert_eq!(eval.cost, 2.0);
//! assert_eq!(eval.gradient.unwrap()[1], -2.0);
//! ```

use crate::types::{DMatrix, DVector, Scalar};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Breakdown of a trajectory cost into its terms.
///
/// Terms that a cost function does not use stay at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostTerms<T> {
    /// Pose goal cost (terminal plus running)
    pub goal: T,
    /// Sphere–obstacle collision cost
    pub collision: T,
    /// Self-collision cost
    pub self_collision: T,
    /// Finite-difference smoothness cost
    pub smoothness: T,
    /// Terminal velocity/acceleration cost
    pub terminal: T,
    /// Joint limit excess cost
    pub bounds: T,
}

impl<T: Scalar> CostTerms<T> {
    /// Sum of all terms.
    pub fn total(&self) -> T {
        self.goal + self.collision + self.self_collision + self.smoothness + self.terminal
            + self.bounds
    }
}

impl<T: Scalar> std::ops::AddAssign for CostTerms<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.goal += rhs.goal;
        self.collision += rhs.collision;
        self.self_collision += rhs.self_collision;
        self.smoothness += rhs.smoothness;
        self.terminal += rhs.terminal;
        self.bounds += rhs.bounds;
    }
}

/// Result of one cost evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEvaluation<T: Scalar> {
    /// Total cost
    pub cost: T,
    /// Gradient with respect to the parameters, when requested
    pub gradient: Option<DVector<T>>,
    /// Per-term breakdown
    pub terms: CostTerms<T>,
}

impl<T: Scalar> CostEvaluation<T> {
    /// Creates an evaluation without a term breakdown.
    pub fn new(cost: T, gradient: Option<DVector<T>>) -> Self {
        Self {
            cost,
            gradient,
            terms: CostTerms::default(),
        }
    }

    /// Sets the term breakdown.
    pub fn with_terms(mut self, terms: CostTerms<T>) -> Self {
        self.terms = terms;
        self
    }
}

/// Trait for batched cost functions.
pub trait CostFunction<T: Scalar>: Debug + Send + Sync {
    /// Length of the parameter vector of one slot.
    fn dimension(&self) -> usize;

    /// Number of slots this cost function can evaluate.
    fn batch_size(&self) -> usize;

    /// Evaluates the cost of `slot` at `x`, with the gradient if requested.
    fn evaluate(&self, slot: usize, x: &DVector<T>, need_gradient: bool) -> CostEvaluation<T>;

    /// Evaluates the cost only.
    fn cost(&self, slot: usize, x: &DVector<T>) -> T {
        self.evaluate(slot, x, false).cost
    }

    /// Evaluates cost and gradient together.
    ///
    /// Returns a zero gradient if the implementation does not supply one.
    fn cost_and_gradient(&self, slot: usize, x: &DVector<T>) -> (T, DVector<T>) {
        let eval = self.evaluate(slot, x, true);
        let gradient = eval
            .gradient
            .unwrap_or_else(|| DVector::zeros(self.dimension()));
        (eval.cost, gradient)
    }

    /// Task-level acceptance check used by convergence.
    ///
    /// A slot is only reported as converged when this holds at its best
    /// parameters.
    fn is_satisfied(&self, _slot: usize, _x: &DVector<T>) -> bool {
        true
    }

    /// Commits `x + alpha * direction`.
    ///
    /// Implementations with frozen parameters override this so that those
    /// components never move.
    fn apply_step(&self, x: &DVector<T>, direction: &DVector<T>, alpha: T) -> DVector<T> {
        x + direction * alpha
    }

    /// Central finite-difference gradient, for checking analytic gradients.
    fn gradient_fd(&self, slot: usize, x: &DVector<T>, h: T) -> DVector<T> {
        let two = <T as Scalar>::from_f64(2.0);
        let mut grad = DVector::zeros(x.len());
        let mut probe = x.clone();
        for i in 0..x.len() {
            let orig = probe[i];
            probe[i] = orig + h;
            let f_plus = self.cost(slot, &probe);
            probe[i] = orig - h;
            let f_minus = self.cost(slot, &probe);
            probe[i] = orig;
            grad[i] = (f_plus - f_minus) / (two * h);
        }
        grad
    }
}

impl<T: Scalar, C: CostFunction<T> + ?Sized> CostFunction<T> for &C {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn batch_size(&self) -> usize {
        (**self).batch_size()
    }

    fn evaluate(&self, slot: usize, x: &DVector<T>, need_gradient: bool) -> CostEvaluation<T> {
        (**self).evaluate(slot, x, need_gradient)
    }

    fn is_satisfied(&self, slot: usize, x: &DVector<T>) -> bool {
        (**self).is_satisfied(slot, x)
    }

    fn apply_step(&self, x: &DVector<T>, direction: &DVector<T>, alpha: T) -> DVector<T> {
        (**self).apply_step(x, direction, alpha)
    }
}

/// A quadratic cost for testing: `f_s(x) = 0.5 xᵀAx + b_sᵀx + c_s`.
#[derive(Debug, Clone)]
pub struct QuadraticCost<T: Scalar> {
    /// Quadratic term (symmetric positive definite for a unique minimum)
    pub a: DMatrix<T>,
    /// Linear term, one per slot
    pub b: Vec<DVector<T>>,
    /// Constant term, one per slot
    pub c: Vec<T>,
}

impl<T: Scalar> QuadraticCost<T> {
    /// Creates a new quadratic cost with one linear term per slot.
    pub fn new(a: DMatrix<T>, b: Vec<DVector<T>>, c: T) -> Self {
        let c = vec![c; b.len()];
        Self { a, b, c }
    }

    /// Creates `f(x) = 0.5 ||x||²` replicated over `batch_size` slots.
    pub fn simple(dim: usize, batch_size: usize) -> Self {
        Self::diagonal(DVector::from_element(dim, T::one()), batch_size)
    }

    /// Creates `f_s(x) = 0.5 ||x − c_s||²`, one center per slot.
    pub fn centered(centers: Vec<DVector<T>>) -> Self {
        let dim = centers.first().map_or(0, |c| c.len());
        let half = <T as Scalar>::from_f64(0.5);
        let c = centers.iter().map(|ci| half * ci.norm_squared()).collect();
        Self {
            a: DMatrix::identity(dim, dim),
            b: centers.into_iter().map(|ci| -ci).collect(),
            c,
        }
    }

    /// Creates an anisotropic quadratic with diagonal `scales`.
    pub fn diagonal(scales: DVector<T>, batch_size: usize) -> Self {
        let dim = scales.len();
        Self {
            a: DMatrix::from_diagonal(&scales),
            b: vec![DVector::zeros(dim); batch_size],
            c: vec![T::zero(); batch_size],
        }
    }
}

impl<T: Scalar> CostFunction<T> for QuadraticCost<T> {
    fn dimension(&self) -> usize {
        self.a.nrows()
    }

    fn batch_size(&self) -> usize {
        self.b.len()
    }

    fn evaluate(&self, slot: usize, x: &DVector<T>, need_gradient: bool) -> CostEvaluation<T> {
        let ax = &self.a * x;
        let b = &self.b[slot];
        let half = <T as Scalar>::from_f64(0.5);
        let cost = half * x.dot(&ax) + b.dot(x) + self.c[slot];
        let gradient = need_gradient.then(|| ax + b);
        CostEvaluation::new(cost, gradient)
    }
}

/// Wrapper to count function evaluations for testing and debugging.
#[derive(Debug)]
pub struct CountingCostFunction<C> {
    /// The underlying cost function
    pub inner: C,
    cost_count: AtomicUsize,
    gradient_count: AtomicUsize,
}

impl<C> CountingCostFunction<C> {
    /// Creates a new counting wrapper around a cost function.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cost_count: AtomicUsize::new(0),
            gradient_count: AtomicUsize::new(0),
        }
    }

    /// Resets all counters to zero.
    pub fn reset_counts(&self) {
        self.cost_count.store(0, Ordering::Relaxed);
        self.gradient_count.store(0, Ordering::Relaxed);
    }

    /// Returns `(cost evaluations, gradient evaluations)`.
    pub fn counts(&self) -> (usize, usize) {
        (
            self.cost_count.load(Ordering::Relaxed),
            self.gradient_count.load(Ordering::Relaxed),
        )
    }
}

impl<T: Scalar, C: CostFunction<T>> CostFunction<T> for CountingCostFunction<C> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    fn evaluate(&self, slot: usize, x: &DVector<T>, need_gradient: bool) -> CostEvaluation<T> {
        self.cost_count.fetch_add(1, Ordering::Relaxed);
        if need_gradient {
            self.gradient_count.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.evaluate(slot, x, need_gradient)
    }

    fn is_satisfied(&self, slot: usize, x: &DVector<T>) -> bool {
        self.inner.is_satisfied(slot, x)
    }

    fn apply_step(&self, x: &DVector<T>, direction: &DVector<T>, alpha: T) -> DVector<T> {
        self.inner.apply_step(x, direction, alpha)
    }
}

/// Utilities for checking gradient implementations.
pub struct DerivativeChecker;

impl DerivativeChecker {
    /// Checks the analytic gradient of `slot` at `x` against central differences.
    ///
    /// Returns `(passes, max_error)`, where the error of each component is
    /// relative to `max(1, |fd|)`.
    pub fn check_gradient<T, C>(cost_fn: &C, slot: usize, x: &DVector<T>, h: T, tol: T) -> (bool, T)
    where
        T: Scalar,
        C: CostFunction<T> + ?Sized,
    {
        let (_, analytic) = cost_fn.cost_and_gradient(slot, x);
        let fd = cost_fn.gradient_fd(slot, x, h);

        let max_error = analytic
            .iter()
            .zip(fd.iter())
            .map(|(a, f)| (*a - *f).abs() / f.abs().max(T::one()))
            .fold(T::zero(), |acc, e| acc.max(e));

        (max_error < tol, max_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quadratic_cost() {
        let cost = QuadraticCost::<f64>::simple(3, 2);
        assert_eq!(cost.dimension(), 3);
        assert_eq!(cost.batch_size(), 2);

        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let (value, grad) = cost.cost_and_gradient(0, &x);
        assert_relative_eq!(value, 7.0);
        assert_relative_eq!(grad, x);
    }

    #[test]
    fn test_centered_cost_per_slot() {
        let centers = vec![
            DVector::from_vec(vec![1.0, 0.0]),
            DVector::from_vec(vec![0.0, -1.0]),
        ];
        let cost = QuadraticCost::<f64>::centered(centers.clone());

        for (slot, center) in centers.iter().enumerate() {
            assert_relative_eq!(cost.cost(slot, center), 0.0, epsilon = 1e-14);
            let (_, g) = cost.cost_and_gradient(slot, center);
            assert_relative_eq!(g.norm(), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_gradient_fd() {
        let scales = DVector::from_vec(vec![1.0, 10.0, 100.0]);
        let cost = QuadraticCost::<f64>::diagonal(scales, 1);
        let x = DVector::from_vec(vec![0.3, -0.2, 0.1]);

        let (passes, err) = DerivativeChecker::check_gradient(&cost, 0, &x, 1e-6, 1e-6);
        assert!(passes, "max error {err}");
    }

    #[test]
    fn test_counting_cost_function() {
        let counting = CountingCostFunction::new(QuadraticCost::<f64>::simple(2, 1));
        let x = DVector::from_vec(vec![1.0, 1.0]);

        let _ = counting.cost(0, &x);
        let _ = counting.cost_and_gradient(0, &x);
        assert_eq!(counting.counts(), (2, 1));

        counting.reset_counts();
        assert_eq!(counting.counts(), (0, 0));
    }

    #[test]
    fn test_default_apply_step() {
        let cost = QuadraticCost::<f64>::simple(2, 1);
        let x = DVector::from_vec(vec![1.0, 1.0]);
        let d = DVector::from_vec(vec![-1.0, 2.0]);
        let next = cost.apply_step(&x, &d, 0.5);
        assert_relative_eq!(next, DVector::from_vec(vec![0.5, 2.0]));
    }

    #[test]
    fn test_cost_terms_total() {
        let mut terms = CostTerms {
            goal: 1.0,
            collision: 2.0,
            ..CostTerms::default()
        };
        terms += CostTerms {
            smoothness: 0.5,
            bounds: 0.25,
            ..CostTerms::default()
        };
        assert_relative_eq!(terms.total(), 3.75);
    }
}
