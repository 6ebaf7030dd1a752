//! Joint-limit cost.
//!
//! Penalizes the squared excess of positions over `[lower, upper]` and of
//! velocities and accelerations over their symmetric limits. Infinite limits
//! never produce an excess.

use crate::tensor_step::{StateGradient, TrajectoryState};
use trajopt_core::{
    parallel::pairwise_sum,
    types::{DMatrix, DVector, Scalar},
};
use trajopt_kinematics::JointLimits;

/// Signed excess of `value` outside `[lo, hi]`, zero inside.
fn excess<T: Scalar>(value: T, lo: T, hi: T) -> T {
    if value > hi {
        value - hi
    } else if value < lo {
        value - lo
    } else {
        T::zero()
    }
}

fn matrix_excess<T: Scalar>(
    values: &DMatrix<T>,
    lower: &DVector<T>,
    upper: &DVector<T>,
    weight: T,
    grad: Option<&mut DMatrix<T>>,
) -> T {
    let half = <T as Scalar>::from_f64(0.5);
    let mut g = grad;
    let rows: Vec<T> = (1..values.nrows())
        .map(|t| {
            let mut row_cost = T::zero();
            for j in 0..values.ncols() {
                let e = excess(values[(t, j)], lower[j], upper[j]);
                if e != T::zero() {
                    row_cost += half * weight * e * e;
                    if let Some(g) = g.as_deref_mut() {
                        g[(t, j)] += weight * e;
                    }
                }
            }
            row_cost
        })
        .collect();
    pairwise_sum(&rows)
}

/// `½·w·Σ excess²` over positions, velocities and accelerations of
/// waypoints `1..T`.
pub fn bounds_cost<T: Scalar>(
    state: &TrajectoryState<T>,
    limits: &JointLimits<T>,
    weight: T,
    grad: Option<&mut StateGradient<T>>,
) -> T {
    if weight <= T::zero() {
        return T::zero();
    }
    let neg_velocity = -limits.velocity.clone();
    let neg_acceleration = -limits.acceleration.clone();

    match grad {
        Some(g) => {
            matrix_excess(&state.positions, &limits.lower, &limits.upper, weight, Some(&mut g.positions))
                + matrix_excess(&state.velocities, &neg_velocity, &limits.velocity, weight, Some(&mut g.velocities))
                + matrix_excess(
                    &state.accelerations,
                    &neg_acceleration,
                    &limits.acceleration,
                    weight,
                    Some(&mut g.accelerations),
                )
        }
        None => {
            matrix_excess(&state.positions, &limits.lower, &limits.upper, weight, None)
                + matrix_excess(&state.velocities, &neg_velocity, &limits.velocity, weight, None)
                + matrix_excess(&state.accelerations, &neg_acceleration, &limits.acceleration, weight, None)
        }
    }
}
