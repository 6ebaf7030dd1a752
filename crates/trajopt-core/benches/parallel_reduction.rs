//! Benchmarks for the deterministic reductions and ordered batch maps.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::DVector;
use trajopt_core::{
    cost_function::{CostFunction, QuadraticCost},
    parallel::{pairwise_sum, pairwise_sum_vectors, ParallelBatch},
};

fn bench_pairwise_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairwise_sum");

    for &n in &[64, 1024, 16384] {
        let values: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).sin()).collect();

        group.bench_with_input(BenchmarkId::new("pairwise", n), &n, |b, _| {
            b.iter(|| black_box(pairwise_sum(&values)));
        });

        group.bench_with_input(BenchmarkId::new("sequential_fold", n), &n, |b, _| {
            b.iter(|| black_box(values.iter().fold(0.0, |acc, v| acc + v)));
        });
    }

    group.finish();
}

fn bench_gradient_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("gradient_accumulation");

    // One partial gradient per waypoint, as the trajectory cost produces them
    for &waypoints in &[16, 32, 64] {
        let dim = waypoints * 7;
        let partials: Vec<DVector<f64>> = (0..waypoints)
            .map(|t| DVector::from_element(dim, t as f64 * 1e-3))
            .collect();

        group.bench_with_input(BenchmarkId::new("tree", waypoints), &waypoints, |b, _| {
            b.iter(|| black_box(pairwise_sum_vectors(&partials, dim)));
        });
    }

    group.finish();
}

fn bench_batch_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_evaluation");

    for &batch in &[4, 32, 128] {
        let dim = 224;
        let cost = QuadraticCost::<f64>::simple(dim, batch);
        let points: Vec<DVector<f64>> = (0..batch)
            .map(|s| DVector::from_element(dim, s as f64 * 0.01))
            .collect();

        for parallel in [false, true] {
            let label = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(label, batch), &batch, |b, _| {
                b.iter(|| {
                    let evals =
                        ParallelBatch::map(&points, parallel, |slot, x| cost.evaluate(slot, x, true));
                    black_box(evals)
                });
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pairwise_sum,
    bench_gradient_accumulation,
    bench_batch_evaluation
);
criterion_main!(benches);
