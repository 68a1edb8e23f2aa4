//! Benchmarks for the loop-tree agent.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use looptree::prelude::*;

fn matmul() -> LoopTree {
    TreeBuilder::new()
        .open_loop("m", 256)
        .open_loop("n", 256)
        .open_loop("k", 256)
        .leaf(OpKind::MulAdd, &["A", "B"], "C")
        .build()
        .unwrap()
}

/// A deeper tree, as reached after a few splits.
fn split_matmul() -> Agent {
    let mut agent = Agent::new(matmul());
    agent
        .apply_action("split_16").unwrap()
        .apply_action("down").unwrap()
        .apply_action("down").unwrap()
        .apply_action("split_32").unwrap()
        .apply_action("down").unwrap()
        .apply_action("down").unwrap()
        .apply_action("split_8").unwrap();
    agent
}

/// Benchmark legality probing of the whole catalog.
fn bench_available_actions(c: &mut Criterion) {
    let agent = split_matmul();
    c.bench_function("available_actions", |b| {
        b.iter(|| black_box(&agent).available_actions().unwrap())
    });
}

/// Benchmark one structural action.
fn bench_apply_split(c: &mut Criterion) {
    let agent = split_matmul();
    c.bench_function("apply_split_2", |b| {
        b.iter(|| {
            let mut a = agent.clone();
            a.apply(black_box(Action::Split(looptree::agent::SplitFactor::F2))).unwrap();
            a
        })
    });
}

/// Benchmark the analytical cost model.
fn bench_cost_model(c: &mut Criterion) {
    let agent = split_matmul();
    c.bench_function("eval_flops_per_second", |b| {
        b.iter(|| black_box(&agent).evaluate(Metric::FlopsPerSecond).unwrap())
    });
}

/// Benchmark checkpoint encode/decode.
fn bench_serialization(c: &mut Criterion) {
    let agent = split_matmul();
    let text = agent.serialize().unwrap();
    c.bench_function("serialize", |b| b.iter(|| black_box(&agent).serialize().unwrap()));
    c.bench_function("deserialize", |b| b.iter(|| agent.deserialize(black_box(&text)).unwrap()));
}

criterion_group!(
    benches,
    bench_available_actions,
    bench_apply_split,
    bench_cost_model,
    bench_serialization
);
criterion_main!(benches);
