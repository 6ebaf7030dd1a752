//! Sphere–obstacle collision cost.
//!
//! For each robot sphere, the distance between its surface and every
//! obstacle is computed and only the worst obstacle is kept. A sphere
//! violates when its clearance `d` drops below `margin + activation_distance`.
//! The penalty gradient with respect to the joint configuration is
//! `−φ'(v) · ∇dᵀ · J_c`, with `J_c` the linear Jacobian of the sphere center.

use crate::contacts::{aggregate, Contact, ContactCost};
use crate::obstacle::Obstacle;
use crate::penalty::PenaltyShape;
use trajopt_core::{
    error::{ModelError, Result},
    types::Scalar,
};
use trajopt_kinematics::SpherePose;

/// Configuration shared by the obstacle and self-collision costs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollisionConfig<T> {
    /// Minimum clearance required for a configuration to count as collision free
    pub margin: T,
    /// Extra distance beyond the margin over which the penalty ramps up
    pub activation_distance: T,
    /// Penalty shape
    pub penalty: PenaltyShape<T>,
    /// Number of worst contacts that contribute (`None` = all)
    pub max_contacts: Option<usize>,
    /// Epsilon used to clamp normalizations
    pub epsilon: T,
}

impl<T: Scalar> Default for CollisionConfig<T> {
    fn default() -> Self {
        Self {
            margin: <T as Scalar>::from_f64(0.01),
            activation_distance: <T as Scalar>::from_f64(0.05),
            penalty: PenaltyShape::default(),
            max_contacts: None,
            epsilon: T::DEFAULT_DENOMINATOR_EPSILON,
        }
    }
}

impl<T: Scalar> CollisionConfig<T> {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the safety margin.
    pub fn with_margin(mut self, margin: T) -> Self {
        self.margin = margin;
        self
    }

    /// Set the activation distance.
    pub fn with_activation_distance(mut self, distance: T) -> Self {
        self.activation_distance = distance;
        self
    }

    /// Set the penalty shape.
    pub fn with_penalty(mut self, penalty: PenaltyShape<T>) -> Self {
        self.penalty = penalty;
        self
    }

    /// Limit the number of contributing contacts.
    pub fn with_max_contacts(mut self, max_contacts: usize) -> Self {
        self.max_contacts = Some(max_contacts);
        self
    }

    /// Distance below which the penalty is active.
    pub fn threshold(&self) -> T {
        self.margin + self.activation_distance
    }

    /// Violation argument `v` for surface distance `d`.
    pub fn violation(&self, distance: T) -> T {
        self.threshold() - distance
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.margin.is_finite() || self.margin < T::zero() {
            return Err(ModelError::invalid_parameter("margin must be non-negative"));
        }
        if !self.activation_distance.is_finite() || self.activation_distance < T::zero() {
            return Err(ModelError::invalid_parameter(
                "activation distance must be non-negative",
            ));
        }
        if !(self.epsilon > T::zero()) {
            return Err(ModelError::invalid_parameter("epsilon must be positive"));
        }
        if self.max_contacts == Some(0) {
            return Err(ModelError::invalid_parameter("max_contacts must be positive"));
        }
        self.penalty.validate()
    }
}

/// Worst obstacle for one sphere: surface distance and unit gradient.
pub fn worst_obstacle<T: Scalar>(
    sphere: &SpherePose<T>,
    obstacles: &[Obstacle<T>],
    eps: T,
) -> Option<(T, nalgebra::Vector3<T>)> {
    let mut worst: Option<(T, nalgebra::Vector3<T>)> = None;
    for obstacle in obstacles {
        let (d, g) = obstacle.signed_distance(&sphere.center, eps);
        let d = d - sphere.radius;
        if worst.as_ref().map_or(true, |(best, _)| d < *best) {
            worst = Some((d, g));
        }
    }
    worst
}

/// Collision cost of one configuration against a set of obstacles.
///
/// `spheres` must carry Jacobians when `need_gradient` is set.
pub fn obstacle_cost<T: Scalar>(
    spheres: &[SpherePose<T>],
    obstacles: &[Obstacle<T>],
    config: &CollisionConfig<T>,
    dofs: usize,
    need_gradient: bool,
) -> ContactCost<T> {
    if obstacles.is_empty() || spheres.is_empty() {
        return ContactCost::zero(dofs, need_gradient);
    }

    let mut min_distance = <T as Scalar>::from_f64(f64::INFINITY);
    let mut contacts = Vec::new();

    for (index, sphere) in spheres.iter().enumerate() {
        let Some((distance, normal)) = worst_obstacle(sphere, obstacles, config.epsilon) else {
            continue;
        };
        min_distance = min_distance.min(distance);

        let (penalty, slope) = config.penalty.evaluate(config.violation(distance));
        if penalty <= T::zero() {
            continue;
        }

        let gradient = if need_gradient {
            sphere
                .jacobian
                .as_ref()
                .map(|jac| jac.tr_mul(&normal) * (-slope))
        } else {
            None
        };

        contacts.push(Contact {
            index,
            distance,
            penalty,
            gradient,
        });
    }

    aggregate(contacts, config.max_contacts, min_distance, dofs, need_gradient)
}

/// Smallest surface distance between any sphere and any obstacle.
pub fn min_clearance<T: Scalar>(spheres: &[SpherePose<T>], obstacles: &[Obstacle<T>], eps: T) -> T {
    spheres
        .iter()
        .filter_map(|s| worst_obstacle(s, obstacles, eps).map(|(d, _)| d))
        .fold(<T as Scalar>::from_f64(f64::INFINITY), |acc, d| acc.min(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use trajopt_core::types::{DVector, PointJacobian};

    fn free_sphere(center: Vector3<f64>, radius: f64) -> SpherePose<f64> {
        // Center moves one-to-one with a 3-DOF translation
        let mut jac = PointJacobian::zeros(3);
        jac.fill_with_identity();
        SpherePose {
            center,
            radius,
            jacobian: Some(jac),
        }
    }

    #[test]
    fn test_zero_cost_beyond_threshold() {
        let config = CollisionConfig::new().with_margin(0.02).with_activation_distance(0.05);
        let obstacles = vec![Obstacle::sphere(Vector3::zeros(), 1.0)];
        let spheres = vec![free_sphere(Vector3::new(1.2, 0.0, 0.0), 0.1)];

        // Clearance 0.1 > 0.07
        let cost = obstacle_cost(&spheres, &obstacles, &config, 3, true);
        assert_eq!(cost.cost, 0.0);
        assert_eq!(cost.violations, 0);
        assert_relative_eq!(cost.min_distance, 0.1, epsilon = 1e-12);
        assert_eq!(cost.gradient.unwrap(), DVector::zeros(3));
    }

    #[test]
    fn test_positive_cost_inside_threshold() {
        let config = CollisionConfig::new()
            .with_margin(0.02)
            .with_activation_distance(0.05)
            .with_penalty(PenaltyShape::Hinge);
        let obstacles = vec![Obstacle::sphere(Vector3::zeros(), 1.0)];
        let spheres = vec![free_sphere(Vector3::new(1.15, 0.0, 0.0), 0.1)];

        let cost = obstacle_cost(&spheres, &obstacles, &config, 3, true);
        // d = 0.05, v = 0.02
        assert_relative_eq!(cost.cost, 0.02, epsilon = 1e-12);
        // Moving away from the obstacle lowers the cost
        let grad = cost.gradient.unwrap();
        assert_relative_eq!(grad, DVector::from_vec(vec![-1.0, 0.0, 0.0]), epsilon = 1e-12);
    }

    #[test]
    fn test_only_worst_obstacle_counts() {
        let config = CollisionConfig::new()
            .with_margin(0.0)
            .with_activation_distance(0.1)
            .with_penalty(PenaltyShape::Hinge);
        let obstacles = vec![
            Obstacle::sphere(Vector3::new(1.0, 0.0, 0.0), 0.5),
            Obstacle::sphere(Vector3::new(-1.0, 0.0, 0.0), 0.9),
        ];
        let spheres = vec![free_sphere(Vector3::zeros(), 0.05)];

        let cost = obstacle_cost(&spheres, &obstacles, &config, 3, false);
        // Worst is the second obstacle: d = 1 - 0.9 - 0.05 = 0.05, v = 0.05
        assert_relative_eq!(cost.cost, 0.05, epsilon = 1e-12);
        assert_relative_eq!(cost.min_distance, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_max_contacts() {
        let config = CollisionConfig::new()
            .with_margin(0.0)
            .with_activation_distance(0.5)
            .with_penalty(PenaltyShape::Hinge)
            .with_max_contacts(1);
        let obstacles = vec![Obstacle::aligned_box(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0))];
        let spheres = vec![
            free_sphere(Vector3::new(1.3, 0.0, 0.0), 0.0),
            free_sphere(Vector3::new(0.0, 1.1, 0.0), 0.0),
        ];

        let cost = obstacle_cost(&spheres, &obstacles, &config, 3, true);
        assert_eq!(cost.violations, 2);
        assert_relative_eq!(cost.cost, 0.4, epsilon = 1e-12);
        let grad = cost.gradient.unwrap();
        assert_relative_eq!(grad, DVector::from_vec(vec![0.0, -1.0, 0.0]), epsilon = 1e-12);
    }

    #[test]
    fn test_validation() {
        assert!(CollisionConfig::<f64>::default().validate().is_ok());
        assert!(CollisionConfig::<f64>::new().with_margin(-0.1).validate().is_err());
        assert!(CollisionConfig::<f64>::new()
            .with_penalty(PenaltyShape::Softplus { beta: 0.0 })
            .validate()
            .is_err());
    }
}
