//! Seed generation for multi-seed planning.
//!
//! A batch usually starts from one interpolated trajectory copied into every
//! slot with Gaussian noise on the interior waypoints, so that the slots
//! explore different homotopy classes around obstacles.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use trajopt_core::{
    error::{ModelError, Result},
    types::{DMatrix, Scalar},
};

/// `count` copies of `base` (`[T, D]` positions), all but the first with
/// independent `N(0, std_dev²)` noise on waypoints `1..T−1`.
///
/// The first and last waypoints are never perturbed.
///
/// # Errors
///
/// Fails if `std_dev` is negative or not finite.
pub fn perturbed_seeds<T: Scalar, R: Rng + ?Sized>(
    base: &DMatrix<T>,
    count: usize,
    std_dev: T,
    rng: &mut R,
) -> Result<Vec<DMatrix<T>>> {
    let std_dev = std_dev.to_f64();
    if !(std_dev >= 0.0 && std_dev.is_finite()) {
        return Err(ModelError::invalid_parameter(format!(
            "seed noise standard deviation must be finite and non-negative, got {std_dev}"
        )));
    }
    let normal = Normal::new(0.0, std_dev)
        .map_err(|e| ModelError::invalid_parameter(format!("seed noise: {e}")))?;
    let last = base.nrows().saturating_sub(1);

    Ok((0..count)
        .map(|k| {
            let mut seed = base.clone();
            if k > 0 {
                for t in 1..last {
                    for j in 0..seed.ncols() {
                        seed[(t, j)] += <T as Scalar>::from_f64(normal.sample(&mut *rng));
                    }
                }
            }
            seed
        })
        .collect())
}
