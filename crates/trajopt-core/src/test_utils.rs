//! Finite-difference helpers shared by the test suites of the workspace.
//!
//! Enabled with the `test-utils` feature (and always in this crate's tests).

use crate::types::{DMatrix, DVector, Scalar};

/// Central finite-difference gradient of a scalar function.
pub fn finite_difference_gradient<T, F>(f: F, x: &DVector<T>, h: T) -> DVector<T>
where
    T: Scalar,
    F: Fn(&DVector<T>) -> T,
{
    let two = <T as Scalar>::from_f64(2.0);
    let mut probe = x.clone();
    DVector::from_iterator(
        x.len(),
        (0..x.len()).map(|i| {
            let orig = probe[i];
            probe[i] = orig + h;
            let plus = f(&probe);
            probe[i] = orig - h;
            let minus = f(&probe);
            probe[i] = orig;
            (plus - minus) / (two * h)
        }),
    )
}

/// Central finite-difference Jacobian of a vector function.
///
/// Column `j` holds the derivative of the output with respect to `x[j]`.
pub fn finite_difference_jacobian<T, F>(f: F, x: &DVector<T>, h: T) -> DMatrix<T>
where
    T: Scalar,
    F: Fn(&DVector<T>) -> DVector<T>,
{
    let two = <T as Scalar>::from_f64(2.0);
    let rows = f(x).len();
    let mut jac = DMatrix::zeros(rows, x.len());
    let mut probe = x.clone();
    for j in 0..x.len() {
        let orig = probe[j];
        probe[j] = orig + h;
        let plus = f(&probe);
        probe[j] = orig - h;
        let minus = f(&probe);
        probe[j] = orig;
        jac.set_column(j, &((plus - minus) / (two * h)));
    }
    jac
}

/// Largest component-wise error, relative to `max(1, |expected|)`.
pub fn max_relative_error<T: Scalar>(actual: &DMatrix<T>, expected: &DMatrix<T>) -> T {
    actual
        .iter()
        .zip(expected.iter())
        .map(|(a, e)| (*a - *e).abs() / e.abs().max(T::one()))
        .fold(T::zero(), |acc, err| acc.max(err))
}
