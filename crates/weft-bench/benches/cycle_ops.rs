//! Criterion benchmarks for whole scheduler cycles.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use weft_bench::reference_schedule;
use weft_engine::CycleEngine;

fn bench_cycle_8x4(c: &mut Criterion) {
    let mut engine = CycleEngine::new(reference_schedule(8, 4, 42)).unwrap();

    // Warm up: first cycle refreshes every context from an empty registry.
    engine.run_cycle().unwrap();

    c.bench_function("cycle_8x4", |b| {
        b.iter(|| {
            let result = engine.run_cycle().unwrap();
            black_box(&result);
        });
    });
    engine.complete_all();
}

fn bench_cycle_32x8(c: &mut Criterion) {
    let mut engine = CycleEngine::new(reference_schedule(32, 8, 42)).unwrap();
    engine.run_cycle().unwrap();

    c.bench_function("cycle_32x8", |b| {
        b.iter(|| {
            let result = engine.run_cycle().unwrap();
            black_box(&result);
        });
    });
    engine.complete_all();
}

fn bench_100_cycles_8x4(c: &mut Criterion) {
    c.bench_function("100_cycles_8x4", |b| {
        b.iter(|| {
            let mut engine = CycleEngine::new(reference_schedule(8, 4, 42)).unwrap();
            let results = engine.run_cycles(100).unwrap();
            engine.complete_all();
            black_box(results.len());
        });
    });
}

criterion_group!(benches, bench_cycle_8x4, bench_cycle_32x8, bench_100_cycles_8x4);
criterion_main!(benches);
