//! Benchmark of regression tree fitting and prediction
//!
//! Run with: cargo bench --bench tree_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::SeedableRng;

use mortality_analysis::pipeline::{MaxFeatures, RegressionTree, TreeParams};

/// Column-major features and a piecewise target over the first two
fn generate_training_data(n_rows: usize, n_features: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let columns: Vec<Vec<f64>> = (0..n_features)
        .map(|_| (0..n_rows).map(|_| rng.gen::<f64>() * 100.0).collect())
        .collect();
    let targets = (0..n_rows)
        .map(|r| {
            let step = if columns[0][r] > 50.0 { 200.0 } else { 50.0 };
            step + columns[1 % n_features][r] * 0.5 + rng.gen::<f64>() * 10.0
        })
        .collect();
    (columns, targets)
}

fn benchmark_fit_by_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_fit_by_rows");
    group.sample_size(20);

    for n_rows in [500, 5_000, 50_000] {
        let data = generate_training_data(n_rows, 9, 42);
        group.throughput(Throughput::Elements(n_rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_rows), &data, |b, (columns, targets)| {
            b.iter(|| RegressionTree::fit(black_box(columns), black_box(targets), &TreeParams::default()))
        });
    }

    group.finish();
}

fn benchmark_fit_by_max_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_fit_by_max_features");
    group.sample_size(20);

    let data = generate_training_data(10_000, 18, 7);
    for (label, max_features) in [("sqrt", MaxFeatures::Sqrt), ("all", MaxFeatures::All)] {
        let params = TreeParams {
            max_features,
            ..TreeParams::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(label), &data, |b, (columns, targets)| {
            b.iter(|| RegressionTree::fit(black_box(columns), black_box(targets), &params))
        });
    }

    group.finish();
}

fn benchmark_predict(c: &mut Criterion) {
    let (columns, targets) = generate_training_data(10_000, 9, 3);
    let tree = RegressionTree::fit(&columns, &targets, &TreeParams::default()).expect("fit");
    let rows: Vec<Vec<f64>> = (0..1_000)
        .map(|r| columns.iter().map(|c| c[r]).collect())
        .collect();

    c.bench_function("tree_predict_1000", |b| {
        b.iter(|| rows.iter().map(|row| tree.predict(black_box(row))).sum::<f64>())
    });
}

criterion_group!(
    benches,
    benchmark_fit_by_rows,
    benchmark_fit_by_max_features,
    benchmark_predict
);
criterion_main!(benches);
