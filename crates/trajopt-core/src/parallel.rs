//! Parallel computing support for batched trajectory optimization.
//!
//! Work is split along two axes: batch slots, and waypoints (or spheres)
//! inside one slot. Both use Rayon. Partial results are always collected in
//! index order and then combined with a fixed-shape pairwise reduction, so a
//! slot's cost and gradient are bit-identical whether the work ran on one
//! thread or many, and regardless of which other slots share the batch.

use crate::types::{DVector, Scalar};
use rayon::prelude::*;

/// Configuration for parallel execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParallelConfig {
    /// Minimum number of batch slots to process slots in parallel
    pub min_batch_for_parallel: usize,
    /// Minimum number of waypoints to process waypoints in parallel
    pub min_waypoints_for_parallel: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        if cfg!(feature = "parallel") {
            Self {
                min_batch_for_parallel: 2,
                min_waypoints_for_parallel: 16,
            }
        } else {
            Self::sequential()
        }
    }
}

impl ParallelConfig {
    /// Create a new parallel configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration that never spawns parallel work.
    pub fn sequential() -> Self {
        Self {
            min_batch_for_parallel: usize::MAX,
            min_waypoints_for_parallel: usize::MAX,
        }
    }

    /// Set the minimum batch size for slot-level parallelism.
    pub fn with_min_batch(mut self, min_batch: usize) -> Self {
        self.min_batch_for_parallel = min_batch;
        self
    }

    /// Set the minimum number of waypoints for waypoint-level parallelism.
    pub fn with_min_waypoints(mut self, min_waypoints: usize) -> Self {
        self.min_waypoints_for_parallel = min_waypoints;
        self
    }

    /// Check if slot-level work should run in parallel.
    pub fn parallel_slots(&self, batch_size: usize) -> bool {
        batch_size >= self.min_batch_for_parallel
    }

    /// Check if waypoint-level work should run in parallel.
    pub fn parallel_waypoints(&self, num_waypoints: usize) -> bool {
        num_waypoints >= self.min_waypoints_for_parallel
    }
}

/// Order-preserving parallel map helpers.
pub struct ParallelBatch;

impl ParallelBatch {
    /// Applies `func` to every index in `0..n`, collecting results in index order.
    pub fn map_indices<R, F>(n: usize, parallel: bool, func: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        if parallel {
            (0..n).into_par_iter().map(func).collect()
        } else {
            (0..n).map(func).collect()
        }
    }

    /// Applies `func` to every item, collecting results in item order.
    pub fn map<I, R, F>(items: &[I], parallel: bool, func: F) -> Vec<R>
    where
        I: Sync,
        R: Send,
        F: Fn(usize, &I) -> R + Sync + Send,
    {
        if parallel {
            items
                .par_iter()
                .enumerate()
                .map(|(i, item)| func(i, item))
                .collect()
        } else {
            items.iter().enumerate().map(|(i, item)| func(i, item)).collect()
        }
    }

    /// Mutates every item in place. Each item is visited by exactly one closure.
    pub fn for_each_mut<I, F>(items: &mut [I], parallel: bool, func: F)
    where
        I: Send,
        F: Fn(usize, &mut I) + Sync + Send,
    {
        if parallel {
            items
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, item)| func(i, item));
        } else {
            items
                .iter_mut()
                .enumerate()
                .for_each(|(i, item)| func(i, item));
        }
    }
}

/// Deterministic pairwise (tree) sum of scalars.
///
/// The reduction tree depends only on `values.len()`.
pub fn pairwise_sum<T: Scalar>(values: &[T]) -> T {
    match values.len() {
        0 => T::zero(),
        1 => values[0],
        2 => values[0] + values[1],
        n => {
            let mid = n / 2;
            pairwise_sum(&values[..mid]) + pairwise_sum(&values[mid..])
        }
    }
}

/// Deterministic pairwise (tree) sum of equally sized vectors.
///
/// Returns a zero vector of length `dim` when `values` is empty.
pub fn pairwise_sum_vectors<T: Scalar>(values: &[DVector<T>], dim: usize) -> DVector<T> {
    match values.len() {
        0 => DVector::zeros(dim),
        1 => values[0].clone(),
        n => {
            let mid = n / 2;
            let mut left = pairwise_sum_vectors(&values[..mid], dim);
            left += pairwise_sum_vectors(&values[mid..], dim);
            left
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parallel_config() {
        let config = ParallelConfig::new().with_min_batch(4).with_min_waypoints(32);
        assert!(!config.parallel_slots(3));
        assert!(config.parallel_slots(4));
        assert!(!config.parallel_waypoints(31));
        assert!(config.parallel_waypoints(32));

        let seq = ParallelConfig::sequential();
        assert!(!seq.parallel_slots(1 << 20));
        assert!(!seq.parallel_waypoints(1 << 20));
    }

    #[test]
    fn test_map_preserves_order() {
        let items: Vec<usize> = (0..100).collect();
        let seq = ParallelBatch::map(&items, false, |i, x| i * 1000 + x);
        let par = ParallelBatch::map(&items, true, |i, x| i * 1000 + x);
        assert_eq!(seq, par);

        let idx = ParallelBatch::map_indices(10, true, |i| i * i);
        assert_eq!(idx, vec![0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
    }

    #[test]
    fn test_for_each_mut() {
        let mut items = vec![0usize; 50];
        ParallelBatch::for_each_mut(&mut items, true, |i, x| *x = 2 * i);
        assert!(items.iter().enumerate().all(|(i, x)| *x == 2 * i));
    }

    #[test]
    fn test_pairwise_sum() {
        let values: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        assert_relative_eq!(pairwise_sum(&values), 5050.0);
        assert_eq!(pairwise_sum::<f64>(&[]), 0.0);
        assert_eq!(pairwise_sum(&[3.5_f64]), 3.5);
    }

    #[test]
    fn test_pairwise_sum_is_schedule_independent() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin() * 1e-3).collect();
        let parts_seq = ParallelBatch::map(&values, false, |_, v| v * 3.0);
        let parts_par = ParallelBatch::map(&values, true, |_, v| v * 3.0);
        let a = pairwise_sum(&parts_seq);
        let b = pairwise_sum(&parts_par);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_pairwise_sum_vectors() {
        let vs: Vec<DVector<f64>> = (0..7)
            .map(|i| DVector::from_element(3, i as f64))
            .collect();
        let total = pairwise_sum_vectors(&vs, 3);
        assert_relative_eq!(total, DVector::from_element(3, 21.0));

        let empty = pairwise_sum_vectors::<f64>(&[], 4);
        assert_eq!(empty, DVector::zeros(4));
    }
}
