//! Self-collision cost between spheres of the same robot.
//!
//! The list of sphere pairs to check is computed once from the chain
//! topology. Pairs that can never collide, or whose distance is fixed by the
//! mounting, are left out of the list instead of being evaluated:
//!
//! - spheres on the same link;
//! - spheres on a parent/child pair of links;
//! - link pairs listed explicitly as ignored;
//! - spheres on links that no joint moves (world-fixed links);
//! - pairs whose allowed distance `r_i + r_j` is zero.

use crate::contacts::{aggregate, Contact, ContactCost};
use crate::sphere_obstacle::CollisionConfig;
use std::collections::HashSet;
use tracing::debug;
use trajopt_core::{
    error::{ModelError, Result},
    numerical::safe_normalize,
    types::Scalar,
};
use trajopt_kinematics::{KinematicChain, SphereModel, SpherePose};

/// Precomputed list of sphere pairs checked for self collision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfCollisionPairs {
    pairs: Vec<(usize, usize)>,
}

impl SelfCollisionPairs {
    /// Builds the pair list.
    ///
    /// `ignored_links` lists link pairs (in either order) that never collide.
    ///
    /// # Errors
    ///
    /// Fails if an ignored pair refers to a link outside the chain.
    pub fn build<T: Scalar>(
        chain: &KinematicChain<T>,
        spheres: &SphereModel<T>,
        ignored_links: &[(usize, usize)],
    ) -> Result<Self> {
        let mut ignored = HashSet::new();
        for &(a, b) in ignored_links {
            if a >= chain.num_links() || b >= chain.num_links() {
                return Err(ModelError::invalid_parameter(format!(
                    "ignored link pair ({a}, {b}) is outside the chain"
                )));
            }
            ignored.insert((a.min(b), a.max(b)));
        }

        let list = spheres.spheres();
        let mut pairs = Vec::new();
        for i in 0..list.len() {
            for j in (i + 1)..list.len() {
                let (si, sj) = (&list[i], &list[j]);
                let (la, lb) = (si.link.min(sj.link), si.link.max(sj.link));
                let excluded = la == lb
                    || chain.are_adjacent(la, lb)
                    || ignored.contains(&(la, lb))
                    || !chain.has_movable_ancestor(si.link)
                    || !chain.has_movable_ancestor(sj.link)
                    || si.radius + sj.radius <= T::zero();
                if !excluded {
                    pairs.push((i, j));
                }
            }
        }

        debug!(
            spheres = list.len(),
            pairs = pairs.len(),
            "built self-collision pair list"
        );
        Ok(Self { pairs })
    }

    /// Builds a list from explicit sphere index pairs.
    pub fn from_pairs(pairs: Vec<(usize, usize)>) -> Self {
        Self { pairs }
    }

    /// The checked pairs.
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Number of checked pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pair is checked.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Self-collision cost of one configuration.
    ///
    /// `spheres` must carry Jacobians when `need_gradient` is set.
    pub fn cost<T: Scalar>(
        &self,
        spheres: &[SpherePose<T>],
        config: &CollisionConfig<T>,
        dofs: usize,
        need_gradient: bool,
    ) -> ContactCost<T> {
        if self.pairs.is_empty() {
            return ContactCost::zero(dofs, need_gradient);
        }

        let mut min_distance = <T as Scalar>::from_f64(f64::INFINITY);
        let mut contacts = Vec::new();

        for (index, &(i, j)) in self.pairs.iter().enumerate() {
            let (a, b) = (&spheres[i], &spheres[j]);
            let diff = a.center - b.center;
            let distance = diff.norm() - a.radius - b.radius;
            min_distance = min_distance.min(distance);

            let (penalty, slope) = config.penalty.evaluate(config.violation(distance));
            if penalty <= T::zero() {
                continue;
            }

            let gradient = if need_gradient {
                let (normal, _) = safe_normalize(&diff, config.epsilon);
                match (&a.jacobian, &b.jacobian) {
                    (Some(ja), Some(jb)) => Some((ja - jb).tr_mul(&normal) * (-slope)),
                    _ => None,
                }
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

    /// Smallest surface distance over the checked pairs.
    pub fn min_distance<T: Scalar>(&self, spheres: &[SpherePose<T>]) -> T {
        self.pairs
            .iter()
            .map(|&(i, j)| pair_distance(&spheres[i], &spheres[j]))
            .fold(<T as Scalar>::from_f64(f64::INFINITY), |acc, d| acc.min(d))
    }
}

/// Surface distance between two spheres (negative when they overlap).
pub fn pair_distance<T: Scalar>(a: &SpherePose<T>, b: &SpherePose<T>) -> T {
    (a.center - b.center).norm() - a.radius - b.radius
}
