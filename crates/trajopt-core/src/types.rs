//! Type definitions and aliases for trajectory optimization.
//!
//! This module provides the scalar trait shared by every crate of the
//! workspace, the nalgebra aliases used for batch buffers, and the numerical
//! constants used as defaults by the kinematics, geometry and optimizer
//! layers.

use nalgebra::{Const, Dyn, OMatrix, OVector, RealField};
use std::fmt::{Debug, Display};

/// Trait for scalar types used in optimization (f32 or f64).
///
/// This trait combines the numeric traits required by the kinematics,
/// collision and optimization kernels. It deliberately builds on
/// [`RealField`] only, so that `sqrt`, `abs`, `max` and friends resolve to a
/// single implementation in generic code.
pub trait Scalar:
    RealField + Copy + Display + Debug + Default + Send + Sync + 'static
{
    /// Machine epsilon for this scalar type.
    const EPSILON: Self;

    /// Default tolerance for convergence checks.
    const DEFAULT_TOLERANCE: Self;

    /// Default tolerance for gradient norm convergence.
    const DEFAULT_GRADIENT_TOLERANCE: Self;

    /// Default epsilon used to clamp near-zero denominators.
    const DEFAULT_DENOMINATOR_EPSILON: Self;

    /// Convert from f64 (for constants).
    fn from_f64(v: f64) -> Self;

    /// Convert to f64 (for logging/display).
    fn to_f64(self) -> f64;

    /// Convert from usize (for iteration counts and averaging).
    fn from_usize(v: usize) -> Self;
}

impl Scalar for f32 {
    const EPSILON: Self = f32::EPSILON;
    const DEFAULT_TOLERANCE: Self = 1e-4;
    const DEFAULT_GRADIENT_TOLERANCE: Self = 1e-4;
    const DEFAULT_DENOMINATOR_EPSILON: Self = 1e-6;

    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn to_f64(self) -> f64 {
        num_traits::cast(self).unwrap_or(f64::NAN)
    }

    fn from_usize(v: usize) -> Self {
        num_traits::cast(v).unwrap_or(f32::MAX)
    }
}

impl Scalar for f64 {
    const EPSILON: Self = f64::EPSILON;
    const DEFAULT_TOLERANCE: Self = 1e-6;
    const DEFAULT_GRADIENT_TOLERANCE: Self = 1e-8;
    const DEFAULT_DENOMINATOR_EPSILON: Self = 1e-12;

    fn from_f64(v: f64) -> Self {
        v
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_usize(v: usize) -> Self {
        num_traits::cast(v).unwrap_or(f64::MAX)
    }
}

/// Type alias for a dynamically-sized matrix.
pub type DMatrix<T> = OMatrix<T, Dyn, Dyn>;

/// Type alias for a statically-sized matrix.
pub type SMatrix<T, const R: usize, const C: usize> = OMatrix<T, Const<R>, Const<C>>;

/// Type alias for a dynamically-sized vector.
pub type DVector<T> = OVector<T, Dyn>;

/// Type alias for a statically-sized vector.
pub type SVector<T, const N: usize> = OVector<T, Const<N>>;

/// 6×D spatial Jacobian: rows 0..3 linear velocity, rows 3..6 angular velocity.
pub type SpatialJacobian<T> = OMatrix<T, Const<6>, Dyn>;

/// 3×D linear-velocity Jacobian of a point.
pub type PointJacobian<T> = OMatrix<T, Const<3>, Dyn>;

/// Numerical constants for different precision levels.
pub mod constants {
    use super::Scalar;

    /// Get machine epsilon for the given scalar type.
    pub fn epsilon<T: Scalar>() -> T {
        T::EPSILON
    }

    /// Get default convergence tolerance.
    pub fn default_tolerance<T: Scalar>() -> T {
        T::DEFAULT_TOLERANCE
    }

    /// Get default gradient convergence tolerance.
    pub fn gradient_tolerance<T: Scalar>() -> T {
        T::DEFAULT_GRADIENT_TOLERANCE
    }

    /// Get the default denominator clamp.
    pub fn denominator_epsilon<T: Scalar>() -> T {
        T::DEFAULT_DENOMINATOR_EPSILON
    }

    /// Pi constant.
    pub fn pi<T: Scalar>() -> T {
        <T as Scalar>::from_f64(std::f64::consts::PI)
    }

    /// Natural logarithm of 2, used by the shifted softplus penalty.
    pub fn ln_2<T: Scalar>() -> T {
        <T as Scalar>::from_f64(std::f64::consts::LN_2)
    }
}
