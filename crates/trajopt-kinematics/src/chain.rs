//! Kinematic chain description.
//!
//! A chain is an ordered list of links in which every parent precedes its
//! children. Each link carries a fixed origin transform relative to its
//! parent, followed by the motion of its joint about (or along) a unit axis
//! expressed in the origin frame:
//!
//! ```text
//! T_link = T_parent · origin · joint(q[dof])
//! ```
//!
//! The chain is validated once by [`KinematicChainBuilder::build`] and is
//! immutable afterwards.

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use rand::Rng;
use trajopt_core::{
    error::{ModelError, Result},
    types::{DVector, Scalar},
};

/// Type of joint connecting a link to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JointType {
    /// Rotation about the joint axis
    Revolute,
    /// Translation along the joint axis
    Prismatic,
    /// No motion
    Fixed,
}

impl JointType {
    /// Returns `true` for revolute and prismatic joints.
    pub fn is_movable(self) -> bool {
        !matches!(self, JointType::Fixed)
    }
}

/// Description of one link, as supplied to the builder.
#[derive(Debug, Clone)]
pub struct LinkSpec<T: Scalar> {
    /// Human-readable link name
    pub name: String,
    /// Index of the parent link (`None` for links attached to the world)
    pub parent: Option<usize>,
    /// Fixed transform from the parent frame to the joint frame
    pub origin: Isometry3<T>,
    /// Joint type
    pub joint: JointType,
    /// Joint axis in the joint frame (ignored for fixed joints)
    pub axis: Vector3<T>,
    /// Index of the joint variable in the configuration vector
    pub dof: Option<usize>,
}

impl<T: Scalar> LinkSpec<T> {
    /// A link rigidly attached to its parent.
    pub fn fixed<S: Into<String>>(name: S, parent: Option<usize>, origin: Isometry3<T>) -> Self {
        Self {
            name: name.into(),
            parent,
            origin,
            joint: JointType::Fixed,
            axis: Vector3::z(),
            dof: None,
        }
    }

    /// A link rotating about `axis`, driven by configuration entry `dof`.
    pub fn revolute<S: Into<String>>(
        name: S,
        parent: Option<usize>,
        origin: Isometry3<T>,
        axis: Vector3<T>,
        dof: usize,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            origin,
            joint: JointType::Revolute,
            axis,
            dof: Some(dof),
        }
    }

    /// A link translating along `axis`, driven by configuration entry `dof`.
    pub fn prismatic<S: Into<String>>(
        name: S,
        parent: Option<usize>,
        origin: Isometry3<T>,
        axis: Vector3<T>,
        dof: usize,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            origin,
            joint: JointType::Prismatic,
            axis,
            dof: Some(dof),
        }
    }
}

/// A validated link of a [`KinematicChain`].
#[derive(Debug, Clone)]
pub struct Link<T: Scalar> {
    /// Human-readable link name
    pub name: String,
    /// Index of the parent link
    pub parent: Option<usize>,
    /// Fixed transform from the parent frame to the joint frame
    pub origin: Isometry3<T>,
    /// Joint type
    pub joint: JointType,
    /// Unit joint axis in the joint frame
    pub axis: Unit<Vector3<T>>,
    /// Index of the joint variable in the configuration vector
    pub dof: Option<usize>,
}

impl<T: Scalar> Link<T> {
    /// Transform contributed by the joint for joint value `value`.
    pub fn joint_motion(&self, value: T) -> Isometry3<T> {
        match self.joint {
            JointType::Revolute => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&self.axis, value),
            ),
            JointType::Prismatic => Isometry3::from_parts(
                Translation3::from(self.axis.into_inner() * value),
                UnitQuaternion::identity(),
            ),
            JointType::Fixed => Isometry3::identity(),
        }
    }
}

/// Per-joint position, velocity and acceleration limits.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointLimits<T: Scalar> {
    /// Lower position limit per DOF
    pub lower: DVector<T>,
    /// Upper position limit per DOF
    pub upper: DVector<T>,
    /// Absolute velocity limit per DOF
    pub velocity: DVector<T>,
    /// Absolute acceleration limit per DOF
    pub acceleration: DVector<T>,
}

impl<T: Scalar> JointLimits<T> {
    /// Limits that never bind.
    pub fn unbounded(num_dofs: usize) -> Self {
        let big = <T as Scalar>::from_f64(f64::INFINITY);
        Self {
            lower: DVector::from_element(num_dofs, -big),
            upper: DVector::from_element(num_dofs, big),
            velocity: DVector::from_element(num_dofs, big),
            acceleration: DVector::from_element(num_dofs, big),
        }
    }

    /// Symmetric position limits `[-bound, bound]` with unbounded rates.
    pub fn symmetric(bound: DVector<T>) -> Self {
        let mut limits = Self::unbounded(bound.len());
        limits.lower = -bound.clone();
        limits.upper = bound;
        limits
    }

    /// Set velocity limits.
    pub fn with_velocity(mut self, velocity: DVector<T>) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set acceleration limits.
    pub fn with_acceleration(mut self, acceleration: DVector<T>) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Number of DOFs covered by these limits.
    pub fn num_dofs(&self) -> usize {
        self.lower.len()
    }

    /// Validates the limits against a DOF count.
    pub fn validate(&self, num_dofs: usize) -> Result<()> {
        for (name, v) in [
            ("lower", &self.lower),
            ("upper", &self.upper),
            ("velocity", &self.velocity),
            ("acceleration", &self.acceleration),
        ] {
            if v.len() != num_dofs {
                return Err(ModelError::dimension_mismatch(
                    format!("{num_dofs} {name} limits"),
                    v.len(),
                ));
            }
        }
        for j in 0..num_dofs {
            if !(self.lower[j] <= self.upper[j]) {
                return Err(ModelError::invalid_parameter(format!(
                    "position limits of DOF {j} are empty or NaN"
                )));
            }
            if !(self.velocity[j] > T::zero()) || !(self.acceleration[j] > T::zero()) {
                return Err(ModelError::invalid_parameter(format!(
                    "rate limits of DOF {j} must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Clamps a configuration into the position limits.
    pub fn clamp(&self, q: &mut DVector<T>) {
        for (j, v) in q.iter_mut().enumerate() {
            *v = (*v).max(self.lower[j]).min(self.upper[j]);
        }
    }
}

/// An immutable, validated kinematic chain.
#[derive(Debug, Clone)]
pub struct KinematicChain<T: Scalar> {
    links: Vec<Link<T>>,
    num_dofs: usize,
    end_effector: usize,
    epsilon: T,
    limits: JointLimits<T>,
    /// Whether each link moves with some joint variable
    movable: Vec<bool>,
}

impl<T: Scalar> KinematicChain<T> {
    /// Starts building a chain with `num_dofs` joint variables.
    pub fn builder(num_dofs: usize) -> KinematicChainBuilder<T> {
        KinematicChainBuilder::new(num_dofs)
    }

    /// A planar serial arm rotating about z, with a fixed tool link at the tip.
    ///
    /// Link `i` is placed `lengths[i-1]` along the x axis of its parent. The
    /// last link (the tool) is the end effector.
    pub fn planar_arm(lengths: &[T]) -> Result<Self> {
        let mut builder = Self::builder(lengths.len());
        for (i, _) in lengths.iter().enumerate() {
            let offset = if i == 0 { T::zero() } else { lengths[i - 1] };
            let parent = i.checked_sub(1);
            builder = builder.add_link(LinkSpec::revolute(
                format!("link_{i}"),
                parent,
                Isometry3::translation(offset, T::zero(), T::zero()),
                Vector3::z(),
                i,
            ));
        }
        let tip = lengths.last().copied().unwrap_or_else(T::zero);
        builder
            .add_link(LinkSpec::fixed(
                "tool",
                lengths.len().checked_sub(1),
                Isometry3::translation(tip, T::zero(), T::zero()),
            ))
            .build()
    }

    /// Number of links.
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// Number of joint variables.
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Index of the end-effector link.
    pub fn end_effector(&self) -> usize {
        self.end_effector
    }

    /// Epsilon used to clamp near-zero denominators.
    pub fn epsilon(&self) -> T {
        self.epsilon
    }

    /// Joint limits.
    pub fn limits(&self) -> &JointLimits<T> {
        &self.limits
    }

    /// Links in topological order.
    pub fn links(&self) -> &[Link<T>] {
        &self.links
    }

    /// Link by index.
    pub fn link(&self, index: usize) -> &Link<T> {
        &self.links[index]
    }

    /// Whether `link` moves with at least one joint variable.
    pub fn has_movable_ancestor(&self, link: usize) -> bool {
        self.movable[link]
    }

    /// Whether the two links are directly connected by a joint.
    pub fn are_adjacent(&self, a: usize, b: usize) -> bool {
        self.links[a].parent == Some(b) || self.links[b].parent == Some(a)
    }

    /// Draws a configuration uniformly inside the position limits.
    ///
    /// Unbounded DOFs are drawn in `[-π, π]`.
    pub fn random_configuration<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<T> {
        let pi = std::f64::consts::PI;
        DVector::from_fn(self.num_dofs, |j, _| {
            let lo = self.limits.lower[j].to_f64();
            let hi = self.limits.upper[j].to_f64();
            let lo = if lo.is_finite() { lo } else { -pi };
            let hi = if hi.is_finite() { hi } else { pi };
            if hi > lo {
                <T as Scalar>::from_f64(rng.gen_range(lo..=hi))
            } else {
                <T as Scalar>::from_f64(lo)
            }
        })
    }
}

/// Builder validating a [`KinematicChain`].
#[derive(Debug, Clone)]
pub struct KinematicChainBuilder<T: Scalar> {
    num_dofs: usize,
    links: Vec<LinkSpec<T>>,
    end_effector: Option<usize>,
    epsilon: T,
    limits: Option<JointLimits<T>>,
}

impl<T: Scalar> KinematicChainBuilder<T> {
    /// Creates an empty builder.
    pub fn new(num_dofs: usize) -> Self {
        Self {
            num_dofs,
            links: Vec::new(),
            end_effector: None,
            epsilon: T::DEFAULT_DENOMINATOR_EPSILON,
            limits: None,
        }
    }

    /// Appends a link.
    pub fn add_link(mut self, link: LinkSpec<T>) -> Self {
        self.links.push(link);
        self
    }

    /// Sets the end-effector link (defaults to the last link).
    pub fn end_effector(mut self, link: usize) -> Self {
        self.end_effector = Some(link);
        self
    }

    /// Sets the epsilon used to clamp near-zero denominators.
    pub fn epsilon(mut self, epsilon: T) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets joint limits (defaults to unbounded).
    pub fn limits(mut self, limits: JointLimits<T>) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Validates the description and builds the chain.
    pub fn build(self) -> Result<KinematicChain<T>> {
        if self.links.is_empty() {
            return Err(ModelError::invalid_parameter("chain has no links"));
        }
        if !(self.epsilon > T::zero()) || !self.epsilon.is_finite() {
            return Err(ModelError::invalid_parameter(
                "denominator epsilon must be positive and finite",
            ));
        }

        let mut dof_owner: Vec<Option<usize>> = vec![None; self.num_dofs];
        let mut links = Vec::with_capacity(self.links.len());
        let mut movable = Vec::with_capacity(self.links.len());

        for (i, spec) in self.links.into_iter().enumerate() {
            if let Some(parent) = spec.parent {
                if parent >= i {
                    return Err(ModelError::invalid_topology(
                        i,
                        format!("parent {parent} does not precede the link"),
                    ));
                }
            }
            let origin_finite = spec.origin.translation.vector.iter().all(|v| v.is_finite())
                && spec.origin.rotation.coords.iter().all(|v| v.is_finite());
            if !origin_finite {
                return Err(ModelError::invalid_topology(i, "origin transform is not finite"));
            }

            let axis = if spec.joint.is_movable() {
                let norm = spec.axis.norm();
                if !norm.is_finite() || norm <= self.epsilon {
                    return Err(ModelError::InvalidAxis { link: i });
                }
                let dof = spec.dof.ok_or_else(|| {
                    ModelError::invalid_topology(i, "movable joint has no DOF index")
                })?;
                if dof >= self.num_dofs {
                    return Err(ModelError::dimension_mismatch(
                        format!("DOF index < {}", self.num_dofs),
                        dof,
                    ));
                }
                if let Some(other) = dof_owner[dof] {
                    return Err(ModelError::invalid_topology(
                        i,
                        format!("DOF {dof} is already driven by link {other}"),
                    ));
                }
                dof_owner[dof] = Some(i);
                Unit::new_normalize(spec.axis)
            } else {
                if spec.dof.is_some() {
                    return Err(ModelError::invalid_topology(i, "fixed joint has a DOF index"));
                }
                Vector3::z_axis()
            };

            let moves = spec.joint.is_movable() || spec.parent.is_some_and(|p| movable[p]);
            movable.push(moves);
            links.push(Link {
                name: spec.name,
                parent: spec.parent,
                origin: spec.origin,
                joint: spec.joint,
                axis,
                dof: spec.dof,
            });
        }

        if let Some(missing) = dof_owner.iter().position(|o| o.is_none()) {
            return Err(ModelError::invalid_parameter(format!(
                "DOF {missing} is not driven by any joint"
            )));
        }

        let end_effector = self.end_effector.unwrap_or(links.len() - 1);
        if end_effector >= links.len() {
            return Err(ModelError::invalid_parameter(format!(
                "end-effector link {end_effector} does not exist"
            )));
        }

        let limits = self
            .limits
            .unwrap_or_else(|| JointLimits::unbounded(self.num_dofs));
        limits.validate(self.num_dofs)?;

        Ok(KinematicChain {
            links,
            num_dofs: self.num_dofs,
            end_effector,
            epsilon: self.epsilon,
            limits,
            movable,
        })
    }
}
