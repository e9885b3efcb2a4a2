//! Criterion benchmarks for whole `execute` calls.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use drift_bench::{gyre_fields, seed_entities};
use drift_engine::{EngineConfig, ExecutionEngine};
use drift_test_utils::fixtures::advect_euler;

fn bench_execute(c: &mut Criterion) {
    let fields = gyre_fields(256, 4, 32);
    for parallel in [false, true] {
        let engine = ExecutionEngine::new(
            advect_euler("U", "V"),
            EngineConfig {
                parallel,
                ..EngineConfig::default()
            },
        )
        .unwrap();
        let name = if parallel {
            "execute_10k_parallel"
        } else {
            "execute_10k_sequential"
        };
        c.bench_function(name, |b| {
            b.iter_batched(
                || seed_entities(10_000, 256, 42),
                |mut set| engine.execute(&mut set, &fields, 1.0, 0.1, None).unwrap(),
                BatchSize::LargeInput,
            );
        });
    }
}

criterion_group!(benches, bench_execute);
criterion_main!(benches);
