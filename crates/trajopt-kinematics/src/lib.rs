//! Kinematic chain model and fused forward kinematics for trajectory optimization.
//!
//! This crate provides the robot-side geometry consumed by the cost terms:
//! the validated [`KinematicChain`], the fused pose + Jacobian evaluator
//! ([`KinematicChain::forward`]) and the spherized collision model
//! ([`SphereModel`]).

pub mod chain;
pub mod fused;
pub mod spheres;

pub use chain::{JointLimits, JointType, KinematicChain, KinematicChainBuilder, Link, LinkSpec};
pub use fused::{JacobianRequest, KinematicsState, LinkPose};
pub use spheres::{CollisionSphere, SphereModel, SpherePose};
