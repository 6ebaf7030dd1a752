//! Collision and goal geometry for trajectory optimization.
//!
//! Every evaluator in this crate works on one joint configuration: it takes
//! the sphere poses (or link pose) produced by the fused kinematics and
//! returns a cost together with its gradient with respect to the joints.
//!
//! - [`obstacle`]: OBB and sphere obstacles with signed distance fields
//! - [`penalty`]: Penalty shapes applied to distance violations
//! - [`sphere_obstacle`]: Robot sphere versus obstacle cost
//! - [`self_collision`]: Robot sphere versus robot sphere cost
//! - [`contacts`]: Worst-contact selection and deterministic aggregation
//! - [`pose_distance`]: Position and orientation goal cost

pub mod contacts;
pub mod obstacle;
pub mod penalty;
pub mod pose_distance;
pub mod self_collision;
pub mod sphere_obstacle;

pub use contacts::{Contact, ContactCost};
pub use obstacle::{validate_obstacles, Obb, Obstacle};
pub use penalty::PenaltyShape;
pub use pose_distance::{pose_distance, PoseCostWeights, PoseDistance, PoseGoal};
pub use self_collision::{pair_distance, SelfCollisionPairs};
pub use sphere_obstacle::{min_clearance, obstacle_cost, CollisionConfig};
