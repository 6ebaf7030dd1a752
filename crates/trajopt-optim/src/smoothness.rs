//! Finite-difference smoothness and terminal-state costs.
//!
//! Both costs are defined on the rolled-out [`TrajectoryState`] and write
//! their gradient into a [`StateGradient`], which the tensor stepper then
//! pulls back to the parameters. Waypoint 0 is fixed by the start state and
//! is left out of every sum.

use crate::tensor_step::{StateGradient, TrajectoryState};
use trajopt_core::{
    error::{ModelError, Result},
    parallel::pairwise_sum,
    types::Scalar,
};

/// Weights of the smoothness and terminal costs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmoothnessWeights<T> {
    /// Weight on squared joint velocities
    pub velocity: T,
    /// Weight on squared joint accelerations
    pub acceleration: T,
    /// Weight on squared joint jerks
    pub jerk: T,
    /// Weight on the squared velocity of the last waypoint
    pub terminal_velocity: T,
    /// Weight on the squared acceleration of the last waypoint
    pub terminal_acceleration: T,
}

impl<T: Scalar> Default for SmoothnessWeights<T> {
    fn default() -> Self {
        Self {
            velocity: <T as Scalar>::from_f64(0.01),
            acceleration: <T as Scalar>::from_f64(0.001),
            jerk: T::zero(),
            terminal_velocity: T::zero(),
            terminal_acceleration: T::zero(),
        }
    }
}

impl<T: Scalar> SmoothnessWeights<T> {
    /// All weights zero.
    pub fn none() -> Self {
        Self {
            velocity: T::zero(),
            acceleration: T::zero(),
            jerk: T::zero(),
            terminal_velocity: T::zero(),
            terminal_acceleration: T::zero(),
        }
    }

    /// Set the velocity, acceleration and jerk weights.
    pub fn with_derivatives(mut self, velocity: T, acceleration: T, jerk: T) -> Self {
        self.velocity = velocity;
        self.acceleration = acceleration;
        self.jerk = jerk;
        self
    }

    /// Set the terminal velocity and acceleration weights.
    pub fn with_terminal(mut self, velocity: T, acceleration: T) -> Self {
        self.terminal_velocity = velocity;
        self.terminal_acceleration = acceleration;
        self
    }

    /// Checks that every weight is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let weights = [
            self.velocity,
            self.acceleration,
            self.jerk,
            self.terminal_velocity,
            self.terminal_acceleration,
        ];
        if weights.iter().all(|w| w.is_finite() && *w >= T::zero()) {
            Ok(())
        } else {
            Err(ModelError::invalid_parameter(
                "smoothness weights must be finite and non-negative",
            ))
        }
    }
}

/// `½·Σ_t (w_v‖v_t‖² + w_a‖a_t‖² + w_j‖j_t‖²)` over waypoints `1..T`.
///
/// When `grad` is given, the partial derivatives are added into it.
pub fn smoothness_cost<T: Scalar>(
    state: &TrajectoryState<T>,
    weights: &SmoothnessWeights<T>,
    mut grad: Option<&mut StateGradient<T>>,
) -> T {
    let half = <T as Scalar>::from_f64(0.5);
    let n = state.num_waypoints();

    let rows: Vec<T> = (1..n)
        .map(|t| {
            let v = state.velocities.row(t);
            let a = state.accelerations.row(t);
            let j = state.jerks.row(t);
            half * (weights.velocity * v.norm_squared()
                + weights.acceleration * a.norm_squared()
                + weights.jerk * j.norm_squared())
        })
        .collect();

    if let Some(g) = grad.as_deref_mut() {
        for t in 1..n {
            let mut gv = g.velocities.row_mut(t);
            gv += state.velocities.row(t) * weights.velocity;
            let mut ga = g.accelerations.row_mut(t);
            ga += state.accelerations.row(t) * weights.acceleration;
            let mut gj = g.jerks.row_mut(t);
            gj += state.jerks.row(t) * weights.jerk;
        }
    }

    pairwise_sum(&rows)
}

/// `½·(w_v‖v_{T−1}‖² + w_a‖a_{T−1}‖²)`: drives the trajectory to rest.
pub fn terminal_cost<T: Scalar>(
    state: &TrajectoryState<T>,
    weights: &SmoothnessWeights<T>,
    grad: Option<&mut StateGradient<T>>,
) -> T {
    let half = <T as Scalar>::from_f64(0.5);
    let last = state.num_waypoints() - 1;
    let v = state.velocities.row(last);
    let a = state.accelerations.row(last);

    if let Some(g) = grad {
        let mut gv = g.velocities.row_mut(last);
        gv += v * weights.terminal_velocity;
        let mut ga = g.accelerations.row_mut(last);
        ga += a * weights.terminal_acceleration;
    }

    half * (weights.terminal_velocity * v.norm_squared()
        + weights.terminal_acceleration * a.norm_squared())
}
