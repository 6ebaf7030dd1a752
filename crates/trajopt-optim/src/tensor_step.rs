//! Tensor stepper: maps optimization parameters to a dynamically consistent
//! trajectory state, and gradients on that state back to the parameters.
//!
//! A trajectory has `T` waypoints of `D` joints. Parameters are stored
//! row-major by waypoint, `x[t·D + j]`.
//!
//! # Integration modes
//!
//! - [`StepMode::Position`]: parameters are waypoint positions. Velocity,
//!   acceleration and jerk are backward finite differences, seeded at
//!   waypoint 0 by the fixed start velocity and acceleration.
//! - [`StepMode::Acceleration`]: parameters are waypoint accelerations.
//!   Velocity and position follow by semi-implicit Euler from the start
//!   state: `v_t = v_{t−1} + a_t·dt`, `q_t = q_{t−1} + v_t·dt`.
//!
//! Both maps are affine in the parameters. [`TensorStepper::backprop`] is the
//! exact adjoint of the linear part, so a cost defined on the state gets its
//! parameter gradient without any finite differencing.
//!
//! Waypoint 0 is always locked. In position mode the last waypoint can be
//! locked too. Locked rows never move under [`TensorStepper::step`] and
//! always receive a zero gradient.

use trajopt_core::{
    error::{ModelError, Result},
    types::{DMatrix, DVector, Scalar},
};

/// Meaning of the optimization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StepMode {
    /// Parameters are joint positions
    #[default]
    Position,
    /// Parameters are joint accelerations
    Acceleration,
}

/// Configuration of the tensor stepper.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepperConfig<T> {
    /// Number of waypoints `T` (at least 2)
    pub num_waypoints: usize,
    /// Number of joints `D`
    pub num_dofs: usize,
    /// Integration time step
    pub dt: T,
    /// Integration mode
    pub mode: StepMode,
    /// Lock the last waypoint (position mode only)
    pub lock_end: bool,
}

impl<T: Scalar> StepperConfig<T> {
    /// Position-mode configuration with a free end waypoint.
    pub fn new(num_waypoints: usize, num_dofs: usize, dt: T) -> Self {
        Self {
            num_waypoints,
            num_dofs,
            dt,
            mode: StepMode::Position,
            lock_end: false,
        }
    }

    /// Set the integration mode.
    pub fn with_mode(mut self, mode: StepMode) -> Self {
        self.mode = mode;
        self
    }

    /// Lock or release the last waypoint.
    pub fn with_lock_end(mut self, lock_end: bool) -> Self {
        self.lock_end = lock_end;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_waypoints < 2 {
            return Err(ModelError::invalid_parameter(
                "a trajectory needs at least two waypoints",
            ));
        }
        if self.num_dofs == 0 {
            return Err(ModelError::invalid_parameter("a trajectory needs at least one joint"));
        }
        if !self.dt.is_finite() || self.dt <= T::zero() {
            return Err(ModelError::invalid_parameter("dt must be positive and finite"));
        }
        if self.lock_end && self.mode == StepMode::Acceleration {
            return Err(ModelError::invalid_parameter(
                "the end waypoint can only be locked in position mode",
            ));
        }
        Ok(())
    }
}

/// Fixed state at waypoint 0.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StartState<T: Scalar> {
    /// Joint positions
    pub position: DVector<T>,
    /// Joint velocities
    pub velocity: DVector<T>,
    /// Joint accelerations
    pub acceleration: DVector<T>,
}

impl<T: Scalar> StartState<T> {
    /// A start state at rest.
    pub fn at_rest(position: DVector<T>) -> Self {
        let n = position.len();
        Self {
            position,
            velocity: DVector::zeros(n),
            acceleration: DVector::zeros(n),
        }
    }
}

/// Positions and their time derivatives, each of shape `[T, D]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryState<T: Scalar> {
    /// Joint positions
    pub positions: DMatrix<T>,
    /// Joint velocities
    pub velocities: DMatrix<T>,
    /// Joint accelerations
    pub accelerations: DMatrix<T>,
    /// Joint jerks
    pub jerks: DMatrix<T>,
    /// Time step
    pub dt: T,
}

impl<T: Scalar> TrajectoryState<T> {
    /// Number of waypoints.
    pub fn num_waypoints(&self) -> usize {
        self.positions.nrows()
    }

    /// Joint positions of waypoint `t`.
    pub fn position(&self, t: usize) -> DVector<T> {
        self.positions.row(t).transpose()
    }
}

/// Gradient of a cost with respect to each part of a [`TrajectoryState`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateGradient<T: Scalar> {
    /// With respect to positions
    pub positions: DMatrix<T>,
    /// With respect to velocities
    pub velocities: DMatrix<T>,
    /// With respect to accelerations
    pub accelerations: DMatrix<T>,
    /// With respect to jerks
    pub jerks: DMatrix<T>,
}

impl<T: Scalar> StateGradient<T> {
    /// A zero gradient for `num_waypoints × num_dofs` states.
    pub fn zeros(num_waypoints: usize, num_dofs: usize) -> Self {
        Self {
            positions: DMatrix::zeros(num_waypoints, num_dofs),
            velocities: DMatrix::zeros(num_waypoints, num_dofs),
            accelerations: DMatrix::zeros(num_waypoints, num_dofs),
            jerks: DMatrix::zeros(num_waypoints, num_dofs),
        }
    }
}

/// Maps parameters to trajectory states and back.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorStepper<T: Scalar> {
    config: StepperConfig<T>,
    start: StartState<T>,
}

impl<T: Scalar> TensorStepper<T> {
    /// Creates a stepper.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the start state does not have
    /// one entry per joint.
    pub fn new(config: StepperConfig<T>, start: StartState<T>) -> Result<Self> {
        config.validate()?;
        for part in [&start.position, &start.velocity, &start.acceleration] {
            if part.len() != config.num_dofs {
                return Err(ModelError::dimension_mismatch(config.num_dofs, part.len()));
            }
            if !part.iter().all(|v| v.is_finite()) {
                return Err(ModelError::invalid_parameter("start state is not finite"));
            }
        }
        Ok(Self { config, start })
    }

    /// The configuration.
    pub fn config(&self) -> &StepperConfig<T> {
        &self.config
    }

    /// The fixed start state.
    pub fn start(&self) -> &StartState<T> {
        &self.start
    }

    /// Number of waypoints.
    pub fn num_waypoints(&self) -> usize {
        self.config.num_waypoints
    }

    /// Number of joints.
    pub fn num_dofs(&self) -> usize {
        self.config.num_dofs
    }

    /// Length of the parameter vector.
    pub fn dimension(&self) -> usize {
        self.config.num_waypoints * self.config.num_dofs
    }

    /// Whether waypoint `t` is locked.
    pub fn is_locked(&self, t: usize) -> bool {
        t == 0 || (self.config.lock_end && t + 1 == self.config.num_waypoints)
    }

    fn to_matrix(&self, x: &DVector<T>) -> DMatrix<T> {
        let d = self.config.num_dofs;
        DMatrix::from_fn(self.config.num_waypoints, d, |t, j| x[t * d + j])
    }

    fn to_params(&self, m: &DMatrix<T>) -> DVector<T> {
        let d = self.config.num_dofs;
        DVector::from_fn(self.dimension(), |i, _| m[(i / d, i % d)])
    }

    /// Backward difference of the rows of `m`, with `first` as row 0.
    fn difference(&self, m: &DMatrix<T>, first: &DVector<T>) -> DMatrix<T> {
        let dt = self.config.dt;
        let mut out = DMatrix::zeros(m.nrows(), m.ncols());
        out.set_row(0, &first.transpose());
        for t in 1..m.nrows() {
            let row = (m.row(t) - m.row(t - 1)) / dt;
            out.set_row(t, &row);
        }
        out
    }

    /// Rolls the parameters out into a trajectory state.
    ///
    /// The parameter row of waypoint 0 is ignored: that waypoint is the fixed
    /// start state.
    ///
    /// # Panics
    ///
    /// Panics if `x` does not have [`dimension`](Self::dimension) entries.
    pub fn rollout(&self, x: &DVector<T>) -> TrajectoryState<T> {
        let dt = self.config.dt;
        let (n, d) = (self.config.num_waypoints, self.config.num_dofs);
        let mut params = self.to_matrix(x);
        // Row 0 always comes from the start state
        let first = match self.config.mode {
            StepMode::Position => &self.start.position,
            StepMode::Acceleration => &self.start.acceleration,
        };
        params.set_row(0, &first.transpose());

        let (positions, velocities, accelerations) = match self.config.mode {
            StepMode::Position => {
                let velocities = self.difference(&params, &self.start.velocity);
                let accelerations = self.difference(&velocities, &self.start.acceleration);
                (params, velocities, accelerations)
            }
            StepMode::Acceleration => {
                let mut positions = DMatrix::zeros(n, d);
                let mut velocities = DMatrix::zeros(n, d);
                positions.set_row(0, &self.start.position.transpose());
                velocities.set_row(0, &self.start.velocity.transpose());
                for t in 1..n {
                    let v = velocities.row(t - 1) + params.row(t) * dt;
                    velocities.set_row(t, &v);
                    let q = positions.row(t - 1) + velocities.row(t) * dt;
                    positions.set_row(t, &q);
                }
                (positions, velocities, params)
            }
        };
        let jerks = self.difference(&accelerations, &DVector::zeros(d));

        TrajectoryState {
            positions,
            velocities,
            accelerations,
            jerks,
            dt,
        }
    }

    /// Pulls a state gradient back to the parameters.
    ///
    /// Rows of locked waypoints are zero.
    pub fn backprop(&self, grad: &StateGradient<T>) -> DVector<T> {
        let dt = self.config.dt;
        let n = self.config.num_waypoints;

        let mut ga = grad.accelerations.clone();
        for t in (1..n).rev() {
            let gj = grad.jerks.row(t) / dt;
            let mut row = ga.row_mut(t);
            row += &gj;
            let mut prev = ga.row_mut(t - 1);
            prev -= &gj;
        }

        let result = match self.config.mode {
            StepMode::Position => {
                // a_0 and v_0 are constants of the start state
                let mut gv = grad.velocities.clone();
                for t in (1..n).rev() {
                    let g = ga.row(t) / dt;
                    let mut row = gv.row_mut(t);
                    row += &g;
                    if t > 1 {
                        let mut prev = gv.row_mut(t - 1);
                        prev -= &g;
                    }
                }
                let mut gq = grad.positions.clone();
                for t in (1..n).rev() {
                    let g = gv.row(t) / dt;
                    let mut row = gq.row_mut(t);
                    row += &g;
                    let mut prev = gq.row_mut(t - 1);
                    prev -= &g;
                }
                gq
            }
            StepMode::Acceleration => {
                let mut gq = grad.positions.clone();
                let mut gv = grad.velocities.clone();
                for t in (1..n).rev() {
                    let g = gq.row(t).clone_owned();
                    let mut vrow = gv.row_mut(t);
                    vrow += &g * dt;
                    let mut prev = gq.row_mut(t - 1);
                    prev += &g;
                }
                for t in (1..n).rev() {
                    let g = gv.row(t).clone_owned();
                    let mut arow = ga.row_mut(t);
                    arow += &g * dt;
                    let mut prev = gv.row_mut(t - 1);
                    prev += &g;
                }
                ga
            }
        };

        let mut out = self.to_params(&result);
        self.mask_locked(&mut out);
        out
    }

    /// Zeroes the rows of locked waypoints.
    pub fn mask_locked(&self, v: &mut DVector<T>) {
        let d = self.config.num_dofs;
        for t in 0..self.config.num_waypoints {
            if self.is_locked(t) {
                v.rows_mut(t * d, d).fill(T::zero());
            }
        }
    }

    /// Commits `x + alpha·direction` without moving locked waypoints.
    pub fn step(&self, x: &DVector<T>, direction: &DVector<T>, alpha: T) -> DVector<T> {
        let d = self.config.num_dofs;
        let mut out = x.clone();
        for t in 0..self.config.num_waypoints {
            if self.is_locked(t) {
                continue;
            }
            let mut rows = out.rows_mut(t * d, d);
            rows.axpy(alpha, &direction.rows(t * d, d), T::one());
        }
        out
    }

    /// Parameters whose rollout reproduces the given position seed.
    ///
    /// Row 0 of the seed is replaced by the start position. In acceleration
    /// mode the reproduction is exact up to rounding.
    ///
    /// # Errors
    ///
    /// Fails if the seed is not `[T, D]`.
    pub fn params_from_positions(&self, seed: &DMatrix<T>) -> Result<DVector<T>> {
        let (n, d) = (self.config.num_waypoints, self.config.num_dofs);
        if seed.nrows() != n || seed.ncols() != d {
            return Err(ModelError::dimension_mismatch(n * d, seed.nrows() * seed.ncols()));
        }
        let mut positions = seed.clone();
        positions.set_row(0, &self.start.position.transpose());

        let params = match self.config.mode {
            StepMode::Position => positions,
            StepMode::Acceleration => {
                let velocities = self.difference(&positions, &self.start.velocity);
                let mut accelerations = self.difference(&velocities, &self.start.acceleration);
                accelerations.set_row(0, &self.start.acceleration.transpose());
                accelerations
            }
        };
        Ok(self.to_params(&params))
    }

    /// Linear interpolation from the start position to `goal`, as parameters.
    pub fn interpolated_params(&self, goal: &DVector<T>) -> Result<DVector<T>> {
        let seed = linear_seed(&self.start.position, goal, self.config.num_waypoints)?;
        self.params_from_positions(&seed)
    }
}

/// `[T, D]` linear interpolation between two configurations.
///
/// # Errors
///
/// Fails if the endpoints differ in length or `num_waypoints < 2`.
pub fn linear_seed<T: Scalar>(
    start: &DVector<T>,
    goal: &DVector<T>,
    num_waypoints: usize,
) -> Result<DMatrix<T>> {
    if start.len() != goal.len() {
        return Err(ModelError::dimension_mismatch(start.len(), goal.len()));
    }
    if num_waypoints < 2 {
        return Err(ModelError::invalid_parameter(
            "a trajectory needs at least two waypoints",
        ));
    }
    let last = <T as Scalar>::from_usize(num_waypoints - 1);
    Ok(DMatrix::from_fn(num_waypoints, start.len(), |t, j| {
        let s = <T as Scalar>::from_usize(t) / last;
        start[j] + (goal[j] - start[j]) * s
    }))
}
