//! Obstacle primitives and their signed distance fields.
//!
//! Distances are negative inside the primitive. Every distance comes with the
//! unit gradient of the distance field at the query point, so that collision
//! costs can be pushed through the sphere-center Jacobians.

use nalgebra::{Isometry3, Point3, Vector3};
use trajopt_core::{
    error::{ModelError, Result},
    numerical::safe_normalize,
    types::Scalar,
};

/// An oriented bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Obb<T: Scalar> {
    /// Pose of the box center in the world frame
    pub pose: Isometry3<T>,
    /// Half extents along the box axes
    pub half_extents: Vector3<T>,
}

impl<T: Scalar> Obb<T> {
    /// Creates a box from its pose and half extents.
    pub fn new(pose: Isometry3<T>, half_extents: Vector3<T>) -> Self {
        Self { pose, half_extents }
    }

    /// Signed distance and unit gradient at world point `p`.
    ///
    /// Outside the box the gradient points away from the closest surface
    /// point. Inside, it is the normal of the face closest to `p`.
    pub fn signed_distance(&self, p: &Vector3<T>, eps: T) -> (T, Vector3<T>) {
        let local = self.pose.inverse_transform_point(&Point3::from(*p)).coords;
        let sign = local.map(|v| if v < T::zero() { -T::one() } else { T::one() });
        let q = local.abs() - self.half_extents;

        let outside = q.map(|v| v.max(T::zero()));
        let outside_norm = outside.norm();

        let (distance, local_grad) = if outside_norm > T::zero() {
            let (dir, _) = safe_normalize(&outside, eps);
            (outside_norm, dir.component_mul(&sign))
        } else {
            // Inside: dominant face, lowest axis index on ties
            let mut axis = 0;
            for i in 1..3 {
                if q[i] > q[axis] {
                    axis = i;
                }
            }
            let mut g = Vector3::zeros();
            g[axis] = sign[axis];
            (q[axis], g)
        };

        (distance, self.pose.rotation * local_grad)
    }
}

/// An obstacle primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Obstacle<T: Scalar> {
    /// Oriented bounding box
    Cuboid(Obb<T>),
    /// Sphere
    Sphere {
        /// Center in the world frame
        center: Vector3<T>,
        /// Radius
        radius: T,
    },
}

impl<T: Scalar> Obstacle<T> {
    /// A box obstacle.
    pub fn cuboid(pose: Isometry3<T>, half_extents: Vector3<T>) -> Self {
        Obstacle::Cuboid(Obb::new(pose, half_extents))
    }

    /// An axis-aligned box obstacle centered at `center`.
    pub fn aligned_box(center: Vector3<T>, half_extents: Vector3<T>) -> Self {
        Self::cuboid(Isometry3::translation(center.x, center.y, center.z), half_extents)
    }

    /// A sphere obstacle.
    pub fn sphere(center: Vector3<T>, radius: T) -> Self {
        Obstacle::Sphere { center, radius }
    }

    /// Checks extents and poses. `index` is used in the error message.
    pub fn validate(&self, index: usize) -> Result<()> {
        match self {
            Obstacle::Cuboid(obb) => {
                let pose_finite = obb.pose.translation.vector.iter().all(|v| v.is_finite())
                    && obb.pose.rotation.coords.iter().all(|v| v.is_finite());
                if !pose_finite {
                    return Err(ModelError::invalid_obstacle(index, "pose is not finite"));
                }
                if !obb.half_extents.iter().all(|h| h.is_finite() && *h > T::zero()) {
                    return Err(ModelError::invalid_obstacle(
                        index,
                        "half extents must be positive and finite",
                    ));
                }
            }
            Obstacle::Sphere { center, radius } => {
                if !center.iter().all(|v| v.is_finite()) {
                    return Err(ModelError::invalid_obstacle(index, "center is not finite"));
                }
                if !radius.is_finite() || *radius <= T::zero() {
                    return Err(ModelError::invalid_obstacle(
                        index,
                        "radius must be positive and finite",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Signed distance and unit gradient at world point `p`.
    ///
    /// At the exact center of a sphere obstacle the gradient is zero.
    pub fn signed_distance(&self, p: &Vector3<T>, eps: T) -> (T, Vector3<T>) {
        match self {
            Obstacle::Cuboid(obb) => obb.signed_distance(p, eps),
            Obstacle::Sphere { center, radius } => {
                let diff = p - center;
                let (dir, _) = safe_normalize(&diff, eps);
                (diff.norm() - *radius, dir)
            }
        }
    }
}

/// Validates a set of obstacles.
pub fn validate_obstacles<T: Scalar>(obstacles: &[Obstacle<T>]) -> Result<()> {
    obstacles
        .iter()
        .enumerate()
        .try_for_each(|(i, o)| o.validate(i))
}
