//! Spherized robot model.
//!
//! The robot's collision geometry is approximated by spheres rigidly attached
//! to links. Sphere centers and their Jacobians are derived from a
//! [`KinematicsState`], so the chain is walked once per configuration no
//! matter how many spheres it carries.

use crate::chain::KinematicChain;
use crate::fused::KinematicsState;
use nalgebra::Vector3;
use trajopt_core::{
    error::{ModelError, Result},
    types::{PointJacobian, Scalar},
};

/// A collision sphere attached to a link.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollisionSphere<T: Scalar> {
    /// Index of the link carrying the sphere
    pub link: usize,
    /// Center of the sphere in link coordinates
    pub offset: Vector3<T>,
    /// Radius (zero for a point)
    pub radius: T,
}

impl<T: Scalar> CollisionSphere<T> {
    /// Creates a sphere on `link` at `offset`.
    pub fn new(link: usize, offset: Vector3<T>, radius: T) -> Self {
        Self {
            link,
            offset,
            radius,
        }
    }
}

/// World position of one sphere for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SpherePose<T: Scalar> {
    /// Center in world coordinates
    pub center: Vector3<T>,
    /// Radius
    pub radius: T,
    /// Linear Jacobian of the center, when the state carries Jacobians
    pub jacobian: Option<PointJacobian<T>>,
}

/// An immutable, validated set of collision spheres.
#[derive(Debug, Clone, Default)]
pub struct SphereModel<T: Scalar> {
    spheres: Vec<CollisionSphere<T>>,
}

impl<T: Scalar> SphereModel<T> {
    /// Validates `spheres` against `chain`.
    ///
    /// # Errors
    ///
    /// Fails on a negative or non-finite radius, a non-finite offset, or a
    /// link index outside the chain.
    pub fn new(chain: &KinematicChain<T>, spheres: Vec<CollisionSphere<T>>) -> Result<Self> {
        for (i, s) in spheres.iter().enumerate() {
            if !s.radius.is_finite() || s.radius < T::zero() {
                return Err(ModelError::InvalidRadius {
                    sphere: i,
                    radius: s.radius.to_f64(),
                });
            }
            if s.link >= chain.num_links() {
                return Err(ModelError::invalid_parameter(format!(
                    "sphere {i} refers to missing link {}",
                    s.link
                )));
            }
            if !s.offset.iter().all(|v| v.is_finite()) {
                return Err(ModelError::invalid_parameter(format!(
                    "sphere {i} has a non-finite offset"
                )));
            }
        }
        Ok(Self { spheres })
    }

    /// An empty model.
    pub fn empty() -> Self {
        Self {
            spheres: Vec::new(),
        }
    }

    /// Number of spheres.
    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    /// Whether the model has no spheres.
    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    /// The spheres.
    pub fn spheres(&self) -> &[CollisionSphere<T>] {
        &self.spheres
    }

    /// World pose of sphere `index`.
    pub fn sphere_pose(&self, state: &KinematicsState<T>, index: usize) -> SpherePose<T> {
        let sphere = &self.spheres[index];
        let center = state.poses[sphere.link].transform_point(&sphere.offset);
        let jacobian = state.point_jacobian(sphere.link, &center);
        SpherePose {
            center,
            radius: sphere.radius,
            jacobian,
        }
    }

    /// World poses of every sphere.
    pub fn sphere_poses(&self, state: &KinematicsState<T>) -> Vec<SpherePose<T>> {
        (0..self.spheres.len())
            .map(|i| self.sphere_pose(state, i))
            .collect()
    }
}
