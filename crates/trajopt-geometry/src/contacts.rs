//! Contact selection and aggregation.
//!
//! Collision evaluators produce one [`Contact`] per violating sphere (or
//! sphere pair). Only the worst `max_contacts` of them contribute to the
//! cost, which keeps the penalty bounded by the closest contacts. The
//! selected contributions are summed with the deterministic pairwise
//! reduction in contact-index order.

use trajopt_core::{
    parallel::{pairwise_sum, pairwise_sum_vectors},
    types::{DVector, Scalar},
};

/// One violating sphere or sphere pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact<T: Scalar> {
    /// Sphere (or pair) index, used for ordering and tie breaking
    pub index: usize,
    /// Signed distance between surfaces
    pub distance: T,
    /// Penalty value
    pub penalty: T,
    /// Penalty gradient with respect to the joint configuration
    pub gradient: Option<DVector<T>>,
}

/// Aggregated collision cost of one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactCost<T: Scalar> {
    /// Sum of the selected penalties
    pub cost: T,
    /// Gradient with respect to the joint configuration, when requested
    pub gradient: Option<DVector<T>>,
    /// Smallest signed surface distance seen (infinite when nothing was checked)
    pub min_distance: T,
    /// Number of violating contacts before selection
    pub violations: usize,
}

impl<T: Scalar> ContactCost<T> {
    /// A zero cost with no contacts.
    pub fn zero(dofs: usize, need_gradient: bool) -> Self {
        Self {
            cost: T::zero(),
            gradient: need_gradient.then(|| DVector::zeros(dofs)),
            min_distance: <T as Scalar>::from_f64(f64::INFINITY),
            violations: 0,
        }
    }
}

/// Keeps the `max_contacts` contacts with the largest penalty.
///
/// Ties are broken by lower index. The survivors are returned in index order.
pub fn select_worst<T: Scalar>(mut contacts: Vec<Contact<T>>, max_contacts: Option<usize>) -> Vec<Contact<T>> {
    if let Some(k) = max_contacts {
        if contacts.len() > k {
            contacts.sort_by(|a, b| {
                b.penalty
                    .partial_cmp(&a.penalty)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.index.cmp(&b.index))
            });
            contacts.truncate(k);
        }
    }
    contacts.sort_by_key(|c| c.index);
    contacts
}

/// Selects the worst contacts and sums their penalties and gradients.
pub fn aggregate<T: Scalar>(
    contacts: Vec<Contact<T>>,
    max_contacts: Option<usize>,
    min_distance: T,
    dofs: usize,
    need_gradient: bool,
) -> ContactCost<T> {
    let violations = contacts.len();
    let selected = select_worst(contacts, max_contacts);

    let penalties: Vec<T> = selected.iter().map(|c| c.penalty).collect();
    let cost = pairwise_sum(&penalties);

    let gradient = need_gradient.then(|| {
        let grads: Vec<DVector<T>> = selected
            .into_iter()
            .filter_map(|c| c.gradient)
            .collect();
        pairwise_sum_vectors(&grads, dofs)
    });

    ContactCost {
        cost,
        gradient,
        min_distance,
        violations,
    }
}
