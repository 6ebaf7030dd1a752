//! Penalty shapes applied to distance violations.
//!
//! Every shape maps the violation `v = margin + activation_distance − d` to a
//! cost `φ(v)` that is exactly zero for `v ≤ 0` and strictly positive for
//! `v > 0`, together with its derivative `φ'(v)`.

use trajopt_core::{
    error::{ModelError, Result},
    types::{constants, Scalar},
};

/// Shape of the penalty applied to a positive violation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PenaltyShape<T> {
    /// `φ(v) = v`
    Hinge,
    /// `φ(v) = v²`
    SquaredHinge,
    /// Quadratic for `v < transition`, then linear with matching slope:
    /// `v² / (2·transition)` and `v − transition / 2`.
    SmoothHinge {
        /// Violation at which the quadratic blend turns linear
        transition: T,
    },
    /// Softplus shifted to vanish at zero:
    /// `(ln(1 + e^{βv}) − ln 2) / β`.
    Softplus {
        /// Sharpness
        beta: T,
    },
}

impl<T: Scalar> Default for PenaltyShape<T> {
    fn default() -> Self {
        PenaltyShape::SquaredHinge
    }
}

impl<T: Scalar> PenaltyShape<T> {
    /// Checks the shape parameters.
    pub fn validate(&self) -> Result<()> {
        match *self {
            PenaltyShape::SmoothHinge { transition } => {
                if !(transition > T::zero()) || !transition.is_finite() {
                    return Err(ModelError::invalid_parameter(
                        "smooth hinge transition must be positive",
                    ));
                }
            }
            PenaltyShape::Softplus { beta } => {
                if !(beta > T::zero()) || !beta.is_finite() {
                    return Err(ModelError::invalid_parameter("softplus beta must be positive"));
                }
            }
            PenaltyShape::Hinge | PenaltyShape::SquaredHinge => {}
        }
        Ok(())
    }

    /// Penalty value and derivative at violation `v`.
    pub fn evaluate(&self, v: T) -> (T, T) {
        if v <= T::zero() {
            return (T::zero(), T::zero());
        }
        let two = <T as Scalar>::from_f64(2.0);
        match *self {
            PenaltyShape::Hinge => (v, T::one()),
            PenaltyShape::SquaredHinge => (v * v, two * v),
            PenaltyShape::SmoothHinge { transition } => {
                if v < transition {
                    (v * v / (two * transition), v / transition)
                } else {
                    (v - transition / two, T::one())
                }
            }
            PenaltyShape::Softplus { beta } => {
                let x = beta * v;
                // ln(1 + e^x) = x + ln(1 + e^-x) for x > 0
                let log1p_exp = x + (-x).exp().ln_1p();
                let value = (log1p_exp - constants::ln_2::<T>()) / beta;
                let slope = T::one() / (T::one() + (-x).exp());
                (value, slope)
            }
        }
    }
}
