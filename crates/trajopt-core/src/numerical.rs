//! Numerical stability utilities.
//!
//! Every division and normalization in the kinematics, geometry and L-BFGS
//! kernels goes through these helpers. A denominator whose magnitude is below
//! the configured epsilon is clamped to `±eps` (keeping its sign), so that
//! degenerate configurations produce large but finite values instead of NaN.

use crate::types::{DVector, Scalar};
use nalgebra::{allocator::Allocator, DefaultAllocator, Dim, OVector};

/// Outcome of a guarded division.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardedValue<T> {
    /// The computed value
    pub value: T,
    /// Whether the denominator was clamped
    pub clamped: bool,
}

/// Clamps a denominator away from zero, keeping its sign.
///
/// Returns the clamped denominator and whether clamping happened. A zero
/// denominator is treated as positive.
pub fn clamp_denominator<T: Scalar>(denominator: T, eps: T) -> (T, bool) {
    if denominator.abs() >= eps {
        (denominator, false)
    } else if denominator < T::zero() {
        (-eps, true)
    } else {
        (eps, true)
    }
}

/// Safe division that clamps the denominator to `eps`.
pub fn safe_divide<T: Scalar>(numerator: T, denominator: T, eps: T) -> GuardedValue<T> {
    let (den, clamped) = clamp_denominator(denominator, eps);
    GuardedValue {
        value: numerator / den,
        clamped,
    }
}

/// Normalizes a vector, clamping its norm to at least `eps`.
///
/// The returned flag is `true` when the norm was clamped.
pub fn safe_normalize<T, D>(v: &OVector<T, D>, eps: T) -> (OVector<T, D>, bool)
where
    T: Scalar,
    D: Dim,
    DefaultAllocator: Allocator<D>,
{
    let norm = v.norm();
    let (den, clamped) = clamp_denominator(norm, eps);
    (v.unscale(den), clamped)
}

/// Returns `true` when every component of the vector is finite.
pub fn all_finite<T: Scalar>(v: &DVector<T>) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Maps a non-finite cost to the largest representable value.
///
/// A trial point with NaN or infinite cost then loses every comparison
/// against a finite cost, and differences of costs stay finite.
pub fn sanitize_cost<T: Scalar>(cost: T) -> T {
    if cost.is_finite() {
        cost
    } else {
        <T as nalgebra::RealField>::max_value().unwrap_or_else(|| <T as Scalar>::from_f64(f64::MAX))
    }
}

/// Clamps a value into `[lo, hi]`.
pub fn clamp<T: Scalar>(x: T, lo: T, hi: T) -> T {
    x.max(lo).min(hi)
}
