//! Per-slot L-BFGS history and direction.
//!
//! L-BFGS (Limited-memory Broyden-Fletcher-Goldfarb-Shanno) approximates the
//! inverse Hessian from the last M curvature pairs `(s, y)`, with
//! `s_k = x_{k+1} − x_k` and `y_k = g_{k+1} − g_k`. Every batch slot owns one
//! [`LbfgsHistory`]. The optimizer is its only writer.
//!
//! ## Two-Loop Recursion
//!
//! ```text
//! q = g
//! for i = newest .. oldest:
//!     α_i = ρ_i <s_i, q>
//!     q = q − α_i y_i
//!
//! r = γ q,   γ = <s, y> / <y, y> of the newest pair
//!
//! for i = oldest .. newest:
//!     β = ρ_i <y_i, r>
//!     r = r + (α_i − β) s_i
//!
//! d = −r
//! ```
//!
//! ## Curvature guard
//!
//! A pair is only stored when `<s, y> > ε·‖s‖·‖y‖`. A pair with
//! non-positive curvature would make the implicit inverse Hessian indefinite,
//! and the two-loop result could then point uphill.
//!
//! ## Fallback
//!
//! When there is no history, or the two-loop result is not finite or not a
//! descent direction, the direction is the scaled steepest descent
//! `−g / max(1, ‖g‖)`. The fallback is counted and logged, and only affects the
//! slot that triggered it.

use std::collections::VecDeque;
use tracing::debug;
use trajopt_core::{
    error::{Degeneracy, ModelError, Result},
    numerical::{all_finite, safe_divide},
    types::{DVector, Scalar},
};

/// Configuration of the L-BFGS direction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LbfgsConfig<T> {
    /// Number of curvature pairs to keep (M)
    pub memory_size: usize,
    /// Relative curvature threshold for accepting a pair
    pub curvature_epsilon: T,
    /// Epsilon used to clamp the scaling denominator
    pub denominator_epsilon: T,
    /// Maximum length of a direction (`None` = unlimited)
    pub max_step_norm: Option<T>,
}

impl<T: Scalar> Default for LbfgsConfig<T> {
    fn default() -> Self {
        Self {
            memory_size: 10,
            curvature_epsilon: <T as Scalar>::from_f64(1e-10),
            denominator_epsilon: T::DEFAULT_DENOMINATOR_EPSILON,
            max_step_norm: None,
        }
    }
}

impl<T: Scalar> LbfgsConfig<T> {
    /// Creates a new configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the memory size (number of curvature pairs to store).
    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    /// Sets the relative curvature threshold.
    pub fn with_curvature_epsilon(mut self, epsilon: T) -> Self {
        self.curvature_epsilon = epsilon;
        self
    }

    /// Limits the direction length.
    pub fn with_max_step_norm(mut self, norm: T) -> Self {
        self.max_step_norm = Some(norm);
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.memory_size == 0 {
            return Err(ModelError::invalid_parameter("L-BFGS memory size must be at least 1"));
        }
        if !(self.curvature_epsilon >= T::zero()) {
            return Err(ModelError::invalid_parameter(
                "curvature epsilon must be non-negative",
            ));
        }
        if !(self.denominator_epsilon > T::zero()) {
            return Err(ModelError::invalid_parameter(
                "denominator epsilon must be positive",
            ));
        }
        if let Some(norm) = self.max_step_norm {
            if !(norm > T::zero()) {
                return Err(ModelError::invalid_parameter("max step norm must be positive"));
            }
        }
        Ok(())
    }
}

/// State of one history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LbfgsPhase {
    /// No previous iterate yet
    Init,
    /// Fewer than M pairs stored
    Accumulating,
    /// M pairs stored; the next pair evicts the oldest
    Ready,
}

/// One stored curvature pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CurvaturePair<T: Scalar> {
    /// Position difference
    pub s: DVector<T>,
    /// Gradient difference
    pub y: DVector<T>,
    /// `1 / <s, y>`
    pub rho: T,
}

/// What [`LbfgsHistory::update`] did with the new iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairUpdate {
    /// First iterate after creation or reset: nothing to pair with
    Started,
    /// A pair was stored
    Stored,
    /// The pair was rejected; the stored pairs are unchanged
    Rejected(Degeneracy),
}

/// How a direction was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionKind {
    /// Two-loop recursion over the stored pairs
    QuasiNewton,
    /// Steepest descent because no pair is stored yet
    SteepestDescent,
    /// Steepest descent because the two-loop result was unusable
    Fallback(Degeneracy),
}

/// A search direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Direction<T: Scalar> {
    /// The direction vector
    pub vector: DVector<T>,
    /// How it was obtained
    pub kind: DirectionKind,
}

impl<T: Scalar> Direction<T> {
    /// Whether the two-loop result was replaced by steepest descent.
    pub fn is_fallback(&self) -> bool {
        matches!(self.kind, DirectionKind::Fallback(_))
    }
}

/// Limited-memory history of one batch slot.
#[derive(Debug, Clone)]
pub struct LbfgsHistory<T: Scalar> {
    memory_size: usize,
    pairs: VecDeque<CurvaturePair<T>>,
    previous_point: Option<DVector<T>>,
    previous_gradient: Option<DVector<T>>,
    rejected_pairs: usize,
    fallbacks: usize,
}

impl<T: Scalar> LbfgsHistory<T> {
    /// Creates an empty history holding at most `memory_size` pairs.
    pub fn new(memory_size: usize) -> Self {
        Self {
            memory_size,
            pairs: VecDeque::with_capacity(memory_size),
            previous_point: None,
            previous_gradient: None,
            rejected_pairs: 0,
            fallbacks: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> LbfgsPhase {
        if self.previous_point.is_none() {
            LbfgsPhase::Init
        } else if self.pairs.len() < self.memory_size {
            LbfgsPhase::Accumulating
        } else {
            LbfgsPhase::Ready
        }
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pair is stored.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Maximum number of pairs.
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// Stored pairs, oldest first.
    pub fn pairs(&self) -> impl Iterator<Item = &CurvaturePair<T>> {
        self.pairs.iter()
    }

    /// Number of pairs rejected by the curvature guard since creation.
    pub fn rejected_pairs(&self) -> usize {
        self.rejected_pairs
    }

    /// Number of steepest-descent fallbacks since creation.
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    /// Records a new iterate and, when possible, the pair it forms with the
    /// previous one.
    pub fn update(&mut self, point: &DVector<T>, gradient: &DVector<T>, config: &LbfgsConfig<T>) -> PairUpdate {
        let outcome = match (&self.previous_point, &self.previous_gradient) {
            (Some(prev_x), Some(prev_g)) => {
                let s = point - prev_x;
                let y = gradient - prev_g;
                let sy = s.dot(&y);
                let bound = config.curvature_epsilon * s.norm() * y.norm();
                if !sy.is_finite() || !bound.is_finite() {
                    self.rejected_pairs += 1;
                    PairUpdate::Rejected(Degeneracy::NonFiniteCost)
                } else if sy <= bound || sy <= T::zero() {
                    self.rejected_pairs += 1;
                    PairUpdate::Rejected(Degeneracy::NonPositiveCurvature)
                } else {
                    if self.pairs.len() == self.memory_size {
                        self.pairs.pop_front();
                    }
                    self.pairs.push_back(CurvaturePair {
                        s,
                        y,
                        rho: T::one() / sy,
                    });
                    PairUpdate::Stored
                }
            }
            _ => PairUpdate::Started,
        };

        self.previous_point = Some(point.clone());
        self.previous_gradient = Some(gradient.clone());
        outcome
    }

    /// Computes a descent direction at gradient `g`.
    pub fn direction(&mut self, gradient: &DVector<T>, config: &LbfgsConfig<T>) -> Direction<T> {
        let direction = if self.pairs.is_empty() {
            Direction {
                vector: steepest_descent(gradient),
                kind: DirectionKind::SteepestDescent,
            }
        } else {
            let d = self.two_loop(gradient, config);
            let failure = if !all_finite(&d) {
                Some(Degeneracy::NonFiniteCost)
            } else if !(gradient.dot(&d) < T::zero()) {
                Some(Degeneracy::NonDescentDirection)
            } else {
                None
            };
            match failure {
                None => Direction {
                    vector: d,
                    kind: DirectionKind::QuasiNewton,
                },
                Some(reason) => {
                    self.fallbacks += 1;
                    debug!(%reason, pairs = self.pairs.len(), "L-BFGS direction replaced by steepest descent");
                    Direction {
                        vector: steepest_descent(gradient),
                        kind: DirectionKind::Fallback(reason),
                    }
                }
            }
        };

        match config.max_step_norm {
            Some(max_norm) => {
                let norm = direction.vector.norm();
                if norm > max_norm {
                    Direction {
                        vector: direction.vector * (max_norm / norm),
                        kind: direction.kind,
                    }
                } else {
                    direction
                }
            }
            None => direction,
        }
    }

    fn two_loop(&self, gradient: &DVector<T>, config: &LbfgsConfig<T>) -> DVector<T> {
        let mut q = gradient.clone();
        let mut alpha = vec![T::zero(); self.pairs.len()];

        for (i, pair) in self.pairs.iter().enumerate().rev() {
            alpha[i] = pair.rho * pair.s.dot(&q);
            q.axpy(-alpha[i], &pair.y, T::one());
        }

        let gamma = match self.pairs.back() {
            Some(newest) => {
                let sy = newest.s.dot(&newest.y);
                let yy = newest.y.dot(&newest.y);
                safe_divide(sy, yy, config.denominator_epsilon).value
            }
            None => T::one(),
        };
        let mut r = q * gamma;

        for (i, pair) in self.pairs.iter().enumerate() {
            let beta = pair.rho * pair.y.dot(&r);
            r.axpy(alpha[i] - beta, &pair.s, T::one());
        }

        -r
    }

    /// Forgets every pair and the previous iterate.
    ///
    /// The next direction is steepest descent. Counters are kept.
    pub fn reset(&mut self) {
        self.pairs.clear();
        self.previous_point = None;
        self.previous_gradient = None;
    }
}

/// `−g / max(1, ‖g‖)`: unit length for large gradients, `−g` near a minimum.
pub fn steepest_descent<T: Scalar>(gradient: &DVector<T>) -> DVector<T> {
    let norm = gradient.norm();
    if norm > T::one() {
        -gradient / norm
    } else {
        -gradient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use trajopt_core::types::DMatrix;

    fn config() -> LbfgsConfig<f64> {
        LbfgsConfig::new().with_memory_size(3)
    }

    #[test]
    fn test_lbfgs_config() {
        let config = LbfgsConfig::<f64>::new()
            .with_memory_size(15)
            .with_curvature_epsilon(1e-8)
            .with_max_step_norm(2.0);
        assert_eq!(config.memory_size, 15);
        assert_eq!(config.max_step_norm, Some(2.0));
        assert!(config.validate().is_ok());
        assert!(LbfgsConfig::<f64>::new().with_memory_size(0).validate().is_err());
        assert!(LbfgsConfig::<f64>::new().with_max_step_norm(0.0).validate().is_err());
    }

    #[test]
    fn test_phases_and_fifo() {
        let config = config();
        let mut history = LbfgsHistory::<f64>::new(3);
        assert_eq!(history.phase(), LbfgsPhase::Init);

        // f(x) = 0.5 * ||x||^2: y = s, always positive curvature
        for k in 0..6 {
            let x = DVector::from_vec(vec![k as f64, (k * k) as f64]);
            let update = history.update(&x, &x, &config);
            if k == 0 {
                assert_eq!(update, PairUpdate::Started);
                assert_eq!(history.phase(), LbfgsPhase::Accumulating);
            } else {
                assert_eq!(update, PairUpdate::Stored);
            }
            assert!(history.len() <= 3);
        }
        assert_eq!(history.phase(), LbfgsPhase::Ready);

        // Oldest remaining pair is the one formed by iterates 2 and 3
        let oldest = history.pairs().next().unwrap();
        assert_relative_eq!(oldest.s, DVector::from_vec(vec![1.0, 5.0]));
    }

    #[test]
    fn test_rejects_negative_curvature() {
        let config = config();
        let mut history = LbfgsHistory::<f64>::new(3);
        history.update(&DVector::from_vec(vec![0.0, 0.0]), &DVector::from_vec(vec![1.0, 0.0]), &config);
        let update = history.update(
            &DVector::from_vec(vec![1.0, 0.0]),
            &DVector::from_vec(vec![0.0, 0.0]),
            &config,
        );
        assert_eq!(update, PairUpdate::Rejected(Degeneracy::NonPositiveCurvature));
        assert!(history.is_empty());
        assert_eq!(history.rejected_pairs(), 1);
    }

    #[test]
    fn test_first_direction_is_steepest_descent() {
        let mut history = LbfgsHistory::<f64>::new(3);
        let g = DVector::from_vec(vec![3.0, 4.0]);
        let d = history.direction(&g, &config());
        assert_eq!(d.kind, DirectionKind::SteepestDescent);
        assert_relative_eq!(d.vector, DVector::from_vec(vec![-0.6, -0.8]));

        let small = DVector::from_vec(vec![0.1, 0.0]);
        let d = history.direction(&small, &config());
        assert_relative_eq!(d.vector, -small);
    }

    #[test]
    fn test_quadratic_newton_direction() {
        // On a quadratic with exact pairs spanning the space, the direction
        // is the Newton step.
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 8.0]);
        let grad = |x: &DVector<f64>| &a * x;
        let config = LbfgsConfig::<f64>::new().with_memory_size(5);
        let mut history = LbfgsHistory::new(5);

        let points = [
            DVector::from_vec(vec![1.0, 1.0]),
            DVector::from_vec(vec![0.5, 1.0]),
            DVector::from_vec(vec![0.5, 0.25]),
        ];
        for p in &points {
            history.update(p, &grad(p), &config);
        }
        let x = &points[2];
        let d = history.direction(&grad(x), &config);
        assert_eq!(d.kind, DirectionKind::QuasiNewton);
        assert_relative_eq!(d.vector, -x.clone(), epsilon = 1e-10);
    }

    #[test]
    fn test_max_step_norm() {
        let config = config().with_max_step_norm(0.1);
        let mut history = LbfgsHistory::<f64>::new(3);
        let d = history.direction(&DVector::from_vec(vec![0.0, 5.0]), &config);
        assert_relative_eq!(d.vector.norm(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_keeps_counters() {
        let config = config();
        let mut history = LbfgsHistory::<f64>::new(3);
        history.update(&DVector::from_vec(vec![0.0]), &DVector::from_vec(vec![1.0]), &config);
        history.update(&DVector::from_vec(vec![1.0]), &DVector::from_vec(vec![0.0]), &config);
        history.update(&DVector::from_vec(vec![2.0]), &DVector::from_vec(vec![1.0]), &config);
        assert_eq!(history.len(), 1);
        history.reset();
        assert_eq!(history.phase(), LbfgsPhase::Init);
        assert!(history.is_empty());
        assert_eq!(history.rejected_pairs(), 1);
    }
}
