//! Criterion benchmarks for u-symreg.
//!
//! Uses random trees over a synthetic dataset to measure interpreter
//! throughput, and random objective vectors for non-dominated sorting.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use u_symreg::dataset::Dataset;
use u_symreg::gp::{BalancedTreeCreator, Creator, GrowTreeCreator};
use u_symreg::interpreter::Interpreter;
use u_symreg::random::create_rng;
use u_symreg::sorting::{DominanceDegreeSorter, FastNondominatedSorter, NondominatedSorter};
use u_symreg::tree::{NodeKind, PrimitiveSet, Tree};

// ===========================================================================
// Synthetic data
// ===========================================================================

const ROWS: usize = 10_000;

fn dataset() -> Dataset {
    let mut rng = create_rng(1);
    let columns: Vec<(String, Vec<f64>)> = (0..5)
        .map(|j| {
            let values: Vec<f64> = (0..ROWS).map(|_| rng.random_range(-1.0..1.0)).collect();
            (format!("x{j}"), values)
        })
        .collect();
    Dataset::new(columns).expect("valid dataset")
}

fn trees(ds: &Dataset, length: usize, count: usize) -> Vec<Tree> {
    let mut pset = PrimitiveSet::arithmetic();
    pset.enable(NodeKind::Exp);
    pset.enable(NodeKind::Sin);
    let creator = BalancedTreeCreator {
        min_length: length,
        max_length: length,
        max_depth: 20,
        irregularity_bias: 0.0,
    };
    let mut rng = create_rng(2);
    (0..count)
        .map(|_| creator.create(&mut rng, &pset, ds.variables()))
        .collect()
}

// ===========================================================================
// Interpreter
// ===========================================================================

fn bench_evaluate(c: &mut Criterion) {
    let ds = dataset();
    let mut group = c.benchmark_group("evaluate");
    group.sample_size(20);

    for &length in &[15, 31, 63] {
        let batch = trees(&ds, length, 100);
        group.bench_with_input(BenchmarkId::from_parameter(length), &batch, |b, batch| {
            b.iter(|| {
                for tree in batch {
                    let values: Vec<f64> =
                        Interpreter::evaluate(tree, &ds, 0..ROWS, None).expect("evaluate");
                    black_box(values);
                }
            })
        });
    }
    group.finish();
}

fn bench_evaluate_f32(c: &mut Criterion) {
    let ds = dataset();
    let batch = trees(&ds, 31, 100);
    c.bench_function("evaluate_f32/31", |b| {
        b.iter(|| {
            for tree in &batch {
                let values: Vec<f32> =
                    Interpreter::evaluate(tree, &ds, 0..ROWS, None).expect("evaluate");
                black_box(values);
            }
        })
    });
}

fn bench_jacobian(c: &mut Criterion) {
    let ds = dataset();
    let mut group = c.benchmark_group("jacobian");
    group.sample_size(20);

    for &length in &[15, 31, 63] {
        let batch = trees(&ds, length, 20);
        group.bench_with_input(BenchmarkId::from_parameter(length), &batch, |b, batch| {
            b.iter(|| {
                for tree in batch {
                    let out = Interpreter::evaluate_with_jacobian::<f64>(tree, &ds, 0..ROWS, None)
                        .expect("jacobian");
                    black_box(out);
                }
            })
        });
    }
    group.finish();
}

// ===========================================================================
// Creators
// ===========================================================================

fn bench_creators(c: &mut Criterion) {
    let ds = dataset();
    let pset = PrimitiveSet::full();
    let grow = GrowTreeCreator::default();
    let btc = BalancedTreeCreator::default();
    let mut rng = create_rng(3);

    c.bench_function("create/grow", |b| {
        b.iter(|| black_box(grow.create(&mut rng, &pset, ds.variables())))
    });
    c.bench_function("create/balanced", |b| {
        b.iter(|| black_box(btc.create(&mut rng, &pset, ds.variables())))
    });
}

// ===========================================================================
// Non-dominated sorting
// ===========================================================================

fn points(n: usize, m: usize) -> Vec<Vec<f64>> {
    let mut rng = create_rng(4);
    (0..n)
        .map(|_| (0..m).map(|_| rng.random_range(0.0..1.0)).collect())
        .collect()
}

fn bench_sorting(c: &mut Criterion) {
    let mut group = c.benchmark_group("nondominated_sort");
    group.sample_size(10);

    for &(n, m) in &[(500, 2), (1000, 2), (1000, 3)] {
        let pts = points(n, m);
        let id = format!("n{n}_m{m}");
        group.bench_with_input(BenchmarkId::new("dominance_degree", &id), &pts, |b, p| {
            b.iter(|| black_box(DominanceDegreeSorter.sort(black_box(p.as_slice()))))
        });
        group.bench_with_input(BenchmarkId::new("fast", &id), &pts, |b, p| {
            b.iter(|| black_box(FastNondominatedSorter.sort(black_box(p.as_slice()))))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_evaluate,
    bench_evaluate_f32,
    bench_jacobian,
    bench_creators,
    bench_sorting
);
criterion_main!(benches);
