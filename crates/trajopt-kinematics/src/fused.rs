//! Fused forward kinematics and Jacobian evaluation.
//!
//! [`KinematicChain::forward`] walks the chain once. For every link it
//! produces the world pose and, on request, the 6×D geometric Jacobian of the
//! link origin, built recursively from the parent's Jacobian:
//!
//! ```text
//! Jv_i[:, c] = Jv_p[:, c] + Jω_p[:, c] × (p_i − p_p)
//! Jω_i[:, c] = Jω_p[:, c]
//! ```
//!
//! followed by the contribution of the link's own joint (`z × (p_i − o)` and
//! `z` for a revolute joint, `z` for a prismatic joint). The joint world axes
//! and origins are kept in the returned [`KinematicsState`], so that point
//! Jacobians of collision spheres reuse them instead of walking the chain
//! again.

use crate::chain::{JointType, KinematicChain};
use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Vector3};
use trajopt_core::{
    error::{ModelError, Result},
    numerical::clamp_denominator,
    parallel::ParallelBatch,
    types::{DVector, PointJacobian, Scalar, SpatialJacobian},
};

/// Which Jacobians [`KinematicChain::forward`] should compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JacobianRequest {
    /// Poses only
    #[default]
    None,
    /// Poses and the Jacobian of every link origin
    AllLinks,
}

/// World pose of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkPose<T: Scalar> {
    /// Rigid transform from the link frame to the world frame
    pub isometry: Isometry3<T>,
}

impl<T: Scalar> LinkPose<T> {
    /// Link origin in world coordinates.
    pub fn position(&self) -> Vector3<T> {
        self.isometry.translation.vector
    }

    /// Rotation matrix of the link frame.
    pub fn rotation_matrix(&self) -> Matrix3<T> {
        self.isometry.rotation.to_rotation_matrix().into_inner()
    }

    /// Pose as a 4×4 homogeneous transform.
    pub fn to_homogeneous(&self) -> Matrix4<T> {
        self.isometry.to_homogeneous()
    }

    /// Maps a point from link coordinates to world coordinates.
    pub fn transform_point(&self, local: &Vector3<T>) -> Vector3<T> {
        (self.isometry * Point3::from(*local)).coords
    }

    /// Orientation as a `[w, x, y, z]` quaternion, extracted from the
    /// rotation matrix with Shepperd's method.
    ///
    /// The largest of the four pivots is clamped to `eps` before it divides.
    /// The result has a non-negative `w`.
    pub fn quaternion(&self, eps: T) -> [T; 4] {
        let r = self.rotation_matrix();
        let one = T::one();
        let half = <T as Scalar>::from_f64(0.5);
        let quarter = <T as Scalar>::from_f64(0.25);
        let trace = r[(0, 0)] + r[(1, 1)] + r[(2, 2)];

        let pivots = [
            trace,
            r[(0, 0)] - r[(1, 1)] - r[(2, 2)],
            r[(1, 1)] - r[(0, 0)] - r[(2, 2)],
            r[(2, 2)] - r[(0, 0)] - r[(1, 1)],
        ];
        let mut best = 0;
        for (i, p) in pivots.iter().enumerate().skip(1) {
            if *p > pivots[best] {
                best = i;
            }
        }

        let s = (one + pivots[best]).max(T::zero()).sqrt() * half;
        let (s, _) = clamp_denominator(s, eps);
        let inv = quarter / s;

        let mut q = match best {
            0 => [
                s,
                (r[(2, 1)] - r[(1, 2)]) * inv,
                (r[(0, 2)] - r[(2, 0)]) * inv,
                (r[(1, 0)] - r[(0, 1)]) * inv,
            ],
            1 => [
                (r[(2, 1)] - r[(1, 2)]) * inv,
                s,
                (r[(0, 1)] + r[(1, 0)]) * inv,
                (r[(0, 2)] + r[(2, 0)]) * inv,
            ],
            2 => [
                (r[(0, 2)] - r[(2, 0)]) * inv,
                (r[(0, 1)] + r[(1, 0)]) * inv,
                s,
                (r[(1, 2)] + r[(2, 1)]) * inv,
            ],
            _ => [
                (r[(1, 0)] - r[(0, 1)]) * inv,
                (r[(0, 2)] + r[(2, 0)]) * inv,
                (r[(1, 2)] + r[(2, 1)]) * inv,
                s,
            ],
        };
        if q[0] < T::zero() {
            for c in q.iter_mut() {
                *c = -*c;
            }
        }
        q
    }
}

/// Output of one fused kinematics evaluation.
#[derive(Debug, Clone)]
pub struct KinematicsState<T: Scalar> {
    /// World pose of every link
    pub poses: Vec<LinkPose<T>>,
    /// 6×D Jacobian of every link origin, when requested
    pub jacobians: Option<Vec<SpatialJacobian<T>>>,
    /// World joint axis of every link (zero for fixed joints)
    pub joint_axes: Vec<Vector3<T>>,
    /// World position of every joint frame
    pub joint_origins: Vec<Vector3<T>>,
    end_effector: usize,
}

impl<T: Scalar> KinematicsState<T> {
    /// Pose of the end-effector link.
    pub fn end_effector_pose(&self) -> &LinkPose<T> {
        &self.poses[self.end_effector]
    }

    /// Jacobian of the end-effector origin, if computed.
    pub fn end_effector_jacobian(&self) -> Option<&SpatialJacobian<T>> {
        self.jacobians.as_ref().map(|j| &j[self.end_effector])
    }

    /// Index of the end-effector link.
    pub fn end_effector(&self) -> usize {
        self.end_effector
    }

    /// Linear Jacobian of a world point rigidly attached to `link`.
    ///
    /// Reuses the link-origin Jacobian: `Jv_p = Jv_link + Jω_link × (p − p_link)`.
    /// Returns `None` if Jacobians were not requested.
    pub fn point_jacobian(&self, link: usize, point: &Vector3<T>) -> Option<PointJacobian<T>> {
        let jac = self.jacobians.as_ref()?.get(link)?;
        let lever = point - self.poses[link].position();
        let mut out = PointJacobian::zeros(jac.ncols());
        for c in 0..jac.ncols() {
            let linear = jac.fixed_view::<3, 1>(0, c).into_owned();
            let angular = jac.fixed_view::<3, 1>(3, c).into_owned();
            out.set_column(c, &(linear + angular.cross(&lever)));
        }
        Some(out)
    }
}

impl<T: Scalar> KinematicChain<T> {
    /// Evaluates link poses and, on request, link-origin Jacobians in one pass.
    ///
    /// # Errors
    ///
    /// Returns a dimension mismatch if `q` does not have one entry per DOF.
    pub fn forward(&self, q: &DVector<T>, request: JacobianRequest) -> Result<KinematicsState<T>> {
        if q.len() != self.num_dofs() {
            return Err(ModelError::dimension_mismatch(self.num_dofs(), q.len()));
        }
        Ok(self.forward_unchecked(q, request))
    }

    /// Same as [`forward`](Self::forward) without the length check.
    ///
    /// # Panics
    ///
    /// Panics if `q` has fewer entries than the chain has DOFs.
    pub fn forward_unchecked(&self, q: &DVector<T>, request: JacobianRequest) -> KinematicsState<T> {
        let n = self.num_links();
        let dofs = self.num_dofs();
        let with_jacobian = request == JacobianRequest::AllLinks;

        let mut poses: Vec<LinkPose<T>> = Vec::with_capacity(n);
        let mut joint_axes = Vec::with_capacity(n);
        let mut joint_origins = Vec::with_capacity(n);
        let mut jacobians: Vec<SpatialJacobian<T>> =
            Vec::with_capacity(if with_jacobian { n } else { 0 });

        for link in self.links() {
            let parent_pose = link
                .parent
                .map_or_else(Isometry3::identity, |p| poses[p].isometry);
            let joint_frame = parent_pose * link.origin;
            let value = link.dof.map_or_else(T::zero, |j| q[j]);
            let pose = joint_frame * link.joint_motion(value);

            let axis = if link.joint.is_movable() {
                joint_frame.rotation * link.axis.into_inner()
            } else {
                Vector3::zeros()
            };
            let origin = joint_frame.translation.vector;
            let position = pose.translation.vector;

            if with_jacobian {
                let mut jac = match link.parent {
                    Some(p) => {
                        let lever = position - poses[p].position();
                        let parent_jac = &jacobians[p];
                        let mut jac = parent_jac.clone();
                        for c in 0..dofs {
                            let angular = parent_jac.fixed_view::<3, 1>(3, c).into_owned();
                            let shift = angular.cross(&lever);
                            let mut col = jac.fixed_view_mut::<3, 1>(0, c);
                            col += shift;
                        }
                        jac
                    }
                    None => SpatialJacobian::zeros(dofs),
                };

                if let Some(j) = link.dof {
                    match link.joint {
                        JointType::Revolute => {
                            let linear = axis.cross(&(position - origin));
                            let mut lin = jac.fixed_view_mut::<3, 1>(0, j);
                            lin += linear;
                            let mut ang = jac.fixed_view_mut::<3, 1>(3, j);
                            ang += axis;
                        }
                        JointType::Prismatic => {
                            let mut lin = jac.fixed_view_mut::<3, 1>(0, j);
                            lin += axis;
                        }
                        JointType::Fixed => {}
                    }
                }
                jacobians.push(jac);
            }

            poses.push(LinkPose { isometry: pose });
            joint_axes.push(axis);
            joint_origins.push(origin);
        }

        KinematicsState {
            poses,
            jacobians: with_jacobian.then_some(jacobians),
            joint_axes,
            joint_origins,
            end_effector: self.end_effector(),
        }
    }

    /// Evaluates a batch of configurations, in parallel when `parallel` is set.
    ///
    /// # Errors
    ///
    /// Returns the first dimension mismatch in the batch.
    pub fn forward_batch(
        &self,
        configurations: &[DVector<T>],
        request: JacobianRequest,
        parallel: bool,
    ) -> Result<Vec<KinematicsState<T>>> {
        if let Some(bad) = configurations.iter().find(|q| q.len() != self.num_dofs()) {
            return Err(ModelError::dimension_mismatch(self.num_dofs(), bad.len()));
        }
        Ok(ParallelBatch::map(configurations, parallel, |_, q| {
            self.forward_unchecked(q, request)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::LinkSpec;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn planar() -> KinematicChain<f64> {
        KinematicChain::planar_arm(&[1.0, 0.8]).unwrap()
    }

    #[test]
    fn test_planar_forward() {
        let chain = planar();
        let q = DVector::from_vec(vec![FRAC_PI_2, 0.0]);
        let state = chain.forward(&q, JacobianRequest::None).unwrap();

        assert!(state.jacobians.is_none());
        let ee = state.end_effector_pose().position();
        assert_relative_eq!(ee, Vector3::new(0.0, 1.8, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_planar_jacobian_closed_form() {
        let chain = planar();
        let (q1, q2) = (0.3, -0.7);
        let q = DVector::from_vec(vec![q1, q2]);
        let state = chain.forward(&q, JacobianRequest::AllLinks).unwrap();
        let jac = state.end_effector_jacobian().unwrap();

        let (l1, l2) = (1.0, 0.8);
        let s1 = f64::sin(q1);
        let c1 = f64::cos(q1);
        let s12 = f64::sin(q1 + q2);
        let c12 = f64::cos(q1 + q2);

        assert_relative_eq!(jac[(0, 0)], -l1 * s1 - l2 * s12, epsilon = 1e-12);
        assert_relative_eq!(jac[(1, 0)], l1 * c1 + l2 * c12, epsilon = 1e-12);
        assert_relative_eq!(jac[(0, 1)], -l2 * s12, epsilon = 1e-12);
        assert_relative_eq!(jac[(1, 1)], l2 * c12, epsilon = 1e-12);
        assert_relative_eq!(jac[(5, 0)], 1.0);
        assert_relative_eq!(jac[(5, 1)], 1.0);
        assert_relative_eq!(jac[(2, 0)], 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let chain = planar();
        let q = DVector::from_vec(vec![0.0]);
        assert!(chain.forward(&q, JacobianRequest::None).is_err());
        assert!(chain
            .forward_batch(&[q], JacobianRequest::AllLinks, false)
            .is_err());
    }

    #[test]
    fn test_prismatic_joint() {
        let chain = KinematicChain::<f64>::builder(2)
            .add_link(LinkSpec::prismatic(
                "slider",
                None,
                Isometry3::identity(),
                Vector3::x(),
                0,
            ))
            .add_link(LinkSpec::revolute(
                "arm",
                Some(0),
                Isometry3::identity(),
                Vector3::z(),
                1,
            ))
            .add_link(LinkSpec::fixed(
                "tip",
                Some(1),
                Isometry3::translation(0.5, 0.0, 0.0),
            ))
            .build()
            .unwrap();

        let q = DVector::from_vec(vec![2.0, FRAC_PI_2]);
        let state = chain.forward(&q, JacobianRequest::AllLinks).unwrap();
        assert_relative_eq!(
            state.end_effector_pose().position(),
            Vector3::new(2.0, 0.5, 0.0),
            epsilon = 1e-12
        );

        let jac = state.end_effector_jacobian().unwrap();
        // Sliding moves the tip along x, rotating moves it along -x here
        assert_relative_eq!(jac[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(jac[(3, 0)], 0.0);
        assert_relative_eq!(jac[(0, 1)], -0.5, epsilon = 1e-12);
        assert_relative_eq!(jac[(5, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_point_jacobian_matches_child_link() {
        let chain = planar();
        let q = DVector::from_vec(vec![0.4, 0.9]);
        let state = chain.forward(&q, JacobianRequest::AllLinks).unwrap();

        // The tool origin is a point attached to link 1
        let tool = state.poses[2].position();
        let from_parent = state.point_jacobian(1, &tool).unwrap();
        let direct = state.jacobians.as_ref().unwrap()[2].fixed_rows::<3>(0).into_owned();
        assert_relative_eq!(from_parent, direct, epsilon = 1e-12);
    }

    #[test]
    fn test_quaternion_matches_nalgebra() {
        let chain = planar();
        for &(a, b) in &[(0.0, 0.0), (0.3, 0.2), (PI - 1e-3, 0.0), (PI, 0.0), (-2.0, 1.0)] {
            let q = DVector::from_vec(vec![a, b]);
            let state = chain.forward(&q, JacobianRequest::None).unwrap();
            let pose = state.end_effector_pose();
            let quat = pose.quaternion(1e-12);
            let expected = pose.isometry.rotation;
            let sign = if expected.w < 0.0 { -1.0 } else { 1.0 };

            // Same rotation up to the double cover
            let dot = quat[0] * expected.w * sign
                + quat[1] * expected.i * sign
                + quat[2] * expected.j * sign
                + quat[3] * expected.k * sign;
            assert_relative_eq!(dot.abs(), 1.0, epsilon = 1e-9);
            assert!(quat.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn test_homogeneous() {
        let chain = planar();
        let q = DVector::from_vec(vec![0.0, 0.0]);
        let state = chain.forward(&q, JacobianRequest::None).unwrap();
        let h = state.end_effector_pose().to_homogeneous();
        assert_relative_eq!(h[(0, 3)], 1.8, epsilon = 1e-12);
        assert_relative_eq!(h[(3, 3)], 1.0);
    }

    #[test]
    fn test_forward_batch_matches_single() {
        let chain = planar();
        let batch: Vec<DVector<f64>> = (0..20)
            .map(|i| DVector::from_vec(vec![i as f64 * 0.1, -(i as f64) * 0.05]))
            .collect();
        let states = chain
            .forward_batch(&batch, JacobianRequest::AllLinks, true)
            .unwrap();

        for (q, state) in batch.iter().zip(&states) {
            let single = chain.forward(q, JacobianRequest::AllLinks).unwrap();
            assert_eq!(
                single.end_effector_pose().position(),
                state.end_effector_pose().position()
            );
            assert_eq!(single.end_effector_jacobian(), state.end_effector_jacobian());
        }
    }
}
