//! Property tests for the collision and goal costs.
//!
//! The collision cost must vanish whenever every clearance exceeds
//! `margin + activation_distance`, and be strictly positive otherwise, for
//! every penalty shape. With no activation band that threshold is the margin
//! itself. Gradients are compared against finite differences
//! through the fused kinematics.

use approx::assert_relative_eq;
use nalgebra::{UnitQuaternion, Vector3};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use trajopt_core::types::{DVector, PointJacobian};
use trajopt_geometry::{
    min_clearance, obstacle_cost, CollisionConfig, Obstacle, PenaltyShape, PoseCostWeights,
    PoseGoal, SelfCollisionPairs,
};
use trajopt_kinematics::{CollisionSphere, JacobianRequest, KinematicChain, SphereModel, SpherePose};

const MARGIN: f64 = 0.02;
const ACTIVATION: f64 = 0.05;

fn shapes() -> Vec<PenaltyShape<f64>> {
    vec![
        PenaltyShape::Hinge,
        PenaltyShape::SquaredHinge,
        PenaltyShape::SmoothHinge { transition: 0.02 },
        PenaltyShape::Softplus { beta: 20.0 },
    ]
}

fn config(shape: PenaltyShape<f64>) -> CollisionConfig<f64> {
    banded_config(shape, ACTIVATION)
}

fn banded_config(shape: PenaltyShape<f64>, activation: f64) -> CollisionConfig<f64> {
    CollisionConfig::new()
        .with_margin(MARGIN)
        .with_activation_distance(activation)
        .with_penalty(shape)
}

fn activation_band() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), Just(ACTIVATION)]
}

fn free_sphere(center: Vector3<f64>, radius: f64) -> SpherePose<f64> {
    let mut jac = PointJacobian::zeros(3);
    jac.fill_with_identity();
    SpherePose {
        center,
        radius,
        jacobian: Some(jac),
    }
}

fn obstacles() -> Vec<Obstacle<f64>> {
    vec![
        Obstacle::aligned_box(Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.3, 0.2, 0.4)),
        Obstacle::sphere(Vector3::new(1.0, 0.5, 0.0), 0.25),
    ]
}

/// Three-link planar arm with spheres on the first and last links.
fn folded_arm() -> (KinematicChain<f64>, SphereModel<f64>) {
    let chain = KinematicChain::planar_arm(&[1.0, 0.8, 0.6]).unwrap();
    let spheres = SphereModel::new(
        &chain,
        vec![
            CollisionSphere::new(0, Vector3::new(0.5, 0.0, 0.0), 0.1),
            CollisionSphere::new(2, Vector3::new(0.3, 0.0, 0.0), 0.08),
            CollisionSphere::new(3, Vector3::zeros(), 0.05),
        ],
    )
    .unwrap();
    (chain, spheres)
}

fn point() -> impl Strategy<Value = Vector3<f64>> {
    (-2.0f64..2.0, -2.0f64..2.0, -2.0f64..2.0).prop_map(|(x, y, z)| Vector3::new(x, y, z))
}

proptest! {
    #[test]
    fn obstacle_cost_is_zero_iff_clear(center in point(), radius in 0.0f64..0.2, activation in activation_band()) {
        let obstacles = obstacles();
        let spheres = vec![free_sphere(center, radius)];
        let clearance = min_clearance(&spheres, &obstacles, 1e-12);
        let threshold = MARGIN + activation;
        // Skip the boundary band where the penalty may round to zero
        prop_assume!((clearance - threshold).abs() > 1e-6);

        for shape in shapes() {
            let cost = obstacle_cost(&spheres, &obstacles, &banded_config(shape, activation), 3, true);
            if clearance > threshold {
                prop_assert_eq!(cost.cost, 0.0);
                prop_assert_eq!(cost.violations, 0);
            } else {
                prop_assert!(cost.cost > 0.0, "{:?} at clearance {}", shape, clearance);
                prop_assert!(cost.gradient.unwrap().iter().all(|g| g.is_finite()));
            }
        }
    }

    #[test]
    fn self_collision_cost_is_zero_iff_clear(
        q in prop::collection::vec(-3.1f64..3.1, 3).prop_map(DVector::from_vec),
        activation in activation_band(),
    ) {
        let (chain, model) = folded_arm();
        let pairs = SelfCollisionPairs::build(&chain, &model, &[]).unwrap();
        let state = chain.forward(&q, JacobianRequest::AllLinks).unwrap();
        let poses = model.sphere_poses(&state);
        let distance = pairs.min_distance(&poses);
        let threshold = MARGIN + activation;
        prop_assume!((distance - threshold).abs() > 1e-6);

        for shape in shapes() {
            let cost = pairs.cost(&poses, &banded_config(shape, activation), 3, true);
            if distance > threshold {
                prop_assert_eq!(cost.cost, 0.0);
            } else {
                prop_assert!(cost.cost > 0.0, "{:?} at distance {}", shape, distance);
            }
            prop_assert!(cost.gradient.unwrap().iter().all(|g| g.is_finite()));
        }
    }

    #[test]
    fn max_contacts_never_increases_cost(center in point(), k in 1usize..3) {
        let obstacles = obstacles();
        let spheres = vec![
            free_sphere(center, 0.1),
            free_sphere(center + Vector3::new(0.1, 0.0, 0.0), 0.1),
            free_sphere(center - Vector3::new(0.0, 0.1, 0.0), 0.1),
        ];
        let all = obstacle_cost(&spheres, &obstacles, &config(PenaltyShape::Hinge), 3, false);
        let capped = obstacle_cost(
            &spheres,
            &obstacles,
            &config(PenaltyShape::Hinge).with_max_contacts(k),
            3,
            false,
        );
        prop_assert!(capped.cost <= all.cost + 1e-12);
        prop_assert_eq!(capped.violations, all.violations);
    }
}

#[test]
fn test_self_collision_pair_list_for_planar_arm() {
    let (chain, model) = folded_arm();
    let pairs = SelfCollisionPairs::build(&chain, &model, &[]).unwrap();
    // link 0 against link 2 and the tool; link 2 and the tool are adjacent
    assert_eq!(pairs.pairs(), &[(0, 1), (0, 2)]);
}

#[test]
fn test_obstacle_gradient_through_kinematics() {
    let chain = KinematicChain::<f64>::planar_arm(&[1.0, 0.8]).unwrap();
    let model = SphereModel::new(
        &chain,
        vec![
            CollisionSphere::new(1, Vector3::new(0.4, 0.0, 0.0), 0.1),
            CollisionSphere::new(2, Vector3::zeros(), 0.05),
        ],
    )
    .unwrap();
    let obstacles = vec![Obstacle::sphere(Vector3::new(1.2, 0.9, 0.0), 0.3)];
    let config = config(PenaltyShape::SquaredHinge);

    let eval = |q: &DVector<f64>| {
        let state = chain.forward(q, JacobianRequest::AllLinks).unwrap();
        obstacle_cost(&model.sphere_poses(&state), &obstacles, &config, 2, true)
    };

    let q = DVector::from_vec(vec![0.4, 0.5]);
    let analytic = eval(&q);
    assert!(analytic.cost > 0.0);
    let grad = analytic.gradient.unwrap();

    let h = 1e-6;
    for j in 0..2 {
        let mut plus = q.clone();
        let mut minus = q.clone();
        plus[j] += h;
        minus[j] -= h;
        let fd = (eval(&plus).cost - eval(&minus).cost) / (2.0 * h);
        assert!((grad[j] - fd).abs() < 1e-5, "dof {j}: {} vs {fd}", grad[j]);
    }
}

#[test]
fn test_pose_goal_roundtrip_through_serde() {
    let goal = PoseGoal::new(
        Vector3::new(0.1, 0.2, 0.3),
        UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
    );
    let json = serde_json::to_string(&goal).unwrap();
    let back: PoseGoal<f64> = serde_json::from_str(&json).unwrap();
    assert_relative_eq!(goal.position, back.position, epsilon = 1e-12);
    assert_relative_eq!(goal.rotation, back.rotation, epsilon = 1e-12);

    let config = config(PenaltyShape::Softplus { beta: 12.0 }).with_max_contacts(4);
    let json = serde_json::to_string(&config).unwrap();
    let back: CollisionConfig<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);

    let weights = PoseCostWeights::new(2.0, 0.5);
    let json = serde_json::to_string(&weights).unwrap();
    let back: PoseCostWeights<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(weights, back);
}
