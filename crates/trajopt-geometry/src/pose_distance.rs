//! Pose distance between a link frame and a goal pose.
//!
//! The position term is a weighted squared error, `½·w_p·Σ a_i e_i²` with
//! `e = p − p_goal`. The rotation term is `½·w_r·(3 − tr(R_goalᵀ R))`, which
//! equals `w_r·(1 − cos θ)` for the geodesic angle θ between the two
//! rotations. It is smooth everywhere, including at θ = π.
//!
//! Gradients are pushed through the link's 6×D spatial Jacobian:
//!
//! - position: `w_p · J_vᵀ (a ⊙ e)`
//! - rotation: `½·w_r · J_ωᵀ vee(M − Mᵀ)` with `M = R R_goalᵀ`

use nalgebra::{Isometry3, Matrix3, UnitQuaternion, Vector3};
use trajopt_core::{
    error::{ModelError, Result},
    numerical::clamp,
    types::{DVector, Scalar, SpatialJacobian},
};
use trajopt_kinematics::LinkPose;

/// Target pose of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoseGoal<T: Scalar> {
    /// Target position in the world frame
    pub position: Vector3<T>,
    /// Target orientation in the world frame
    pub rotation: UnitQuaternion<T>,
}

impl<T: Scalar> PoseGoal<T> {
    /// Goal from position and orientation.
    pub fn new(position: Vector3<T>, rotation: UnitQuaternion<T>) -> Self {
        Self { position, rotation }
    }

    /// Goal with identity orientation.
    pub fn position(position: Vector3<T>) -> Self {
        Self::new(position, UnitQuaternion::identity())
    }

    /// Goal equal to a rigid transform.
    pub fn from_isometry(iso: &Isometry3<T>) -> Self {
        Self::new(iso.translation.vector, iso.rotation)
    }

    /// Checks that the goal is finite.
    pub fn validate(&self, slot: usize) -> Result<()> {
        let finite = self.position.iter().all(|v| v.is_finite())
            && self.rotation.coords.iter().all(|v| v.is_finite());
        if finite {
            Ok(())
        } else {
            Err(ModelError::invalid_parameter(format!(
                "goal of slot {slot} is not finite"
            )))
        }
    }
}

/// Weights of the pose distance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoseCostWeights<T: Scalar> {
    /// Weight of the position error
    pub position_weight: T,
    /// Weight of the rotation error. Zero disables orientation tracking.
    pub rotation_weight: T,
    /// Per-axis weights applied to the position error
    pub axis_weights: Vector3<T>,
}

impl<T: Scalar> Default for PoseCostWeights<T> {
    fn default() -> Self {
        Self {
            position_weight: T::one(),
            rotation_weight: T::one(),
            axis_weights: Vector3::repeat(T::one()),
        }
    }
}

impl<T: Scalar> PoseCostWeights<T> {
    /// Weights with uniform axis weights.
    pub fn new(position_weight: T, rotation_weight: T) -> Self {
        Self {
            position_weight,
            rotation_weight,
            ..Self::default()
        }
    }

    /// Position-only tracking.
    pub fn position_only(position_weight: T) -> Self {
        Self::new(position_weight, T::zero())
    }

    /// Set the per-axis position weights.
    pub fn with_axis_weights(mut self, axis_weights: Vector3<T>) -> Self {
        self.axis_weights = axis_weights;
        self
    }

    /// Checks that every weight is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let ok = |w: T| w.is_finite() && w >= T::zero();
        if !ok(self.position_weight) || !ok(self.rotation_weight) || !self.axis_weights.iter().all(|w| ok(*w)) {
            return Err(ModelError::invalid_parameter(
                "pose weights must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Pose distance of one link frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseDistance<T: Scalar> {
    /// Weighted cost
    pub cost: T,
    /// Gradient with respect to the joint configuration, when a Jacobian was given
    pub gradient: Option<DVector<T>>,
    /// Euclidean position error
    pub position_error: T,
    /// Geodesic rotation error in radians
    pub rotation_error: T,
}

/// Evaluates the pose distance of `pose` to `goal`.
///
/// Pass the link's spatial Jacobian to get the gradient.
pub fn pose_distance<T: Scalar>(
    pose: &LinkPose<T>,
    jacobian: Option<&SpatialJacobian<T>>,
    goal: &PoseGoal<T>,
    weights: &PoseCostWeights<T>,
) -> PoseDistance<T> {
    let half = <T as Scalar>::from_f64(0.5);
    let two = <T as Scalar>::from_f64(2.0);
    let three = <T as Scalar>::from_f64(3.0);

    let error = pose.position() - goal.position;
    let weighted = error.component_mul(&weights.axis_weights);
    let position_cost = half * weights.position_weight * weighted.dot(&error);

    let r = pose.rotation_matrix();
    let rg = goal.rotation.to_rotation_matrix().into_inner();
    let trace = (rg.transpose() * r).trace();
    let rotation_cost = half * weights.rotation_weight * (three - trace);
    let cos_theta = clamp((trace - T::one()) / two, -T::one(), T::one());

    let gradient = jacobian.map(|jac| {
        let jv = jac.fixed_rows::<3>(0);
        let jw = jac.fixed_rows::<3>(3);
        let mut grad = jv.tr_mul(&weighted) * weights.position_weight;
        if weights.rotation_weight > T::zero() {
            let m: Matrix3<T> = r * rg.transpose();
            let skew = m - m.transpose();
            let vee = Vector3::new(skew[(2, 1)], skew[(0, 2)], skew[(1, 0)]);
            grad += jw.tr_mul(&vee) * (half * weights.rotation_weight);
        }
        grad
    });

    PoseDistance {
        cost: position_cost + rotation_cost,
        gradient,
        position_error: error.norm(),
        rotation_error: cos_theta.acos(),
    }
}
