//! Criterion micro-benchmarks for field sampling.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use drift_bench::gyre_fields;

fn bench_sample_resident(c: &mut Criterion) {
    let fields = gyre_fields(256, 4, 32);
    let u = fields.sampler("U").unwrap();
    u.sample(0.5, 0.0, 100.0, 100.0).unwrap();

    c.bench_function("sample_resident_block", |b| {
        b.iter(|| black_box(u.sample(black_box(0.5), 0.0, 100.25, 100.75).unwrap()));
    });
}

fn bench_sample_sweep(c: &mut Criterion) {
    let fields = gyre_fields(256, 4, 32);
    let u = fields.sampler("U").unwrap();

    c.bench_function("sample_sweep_1k_points", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for k in 0..1000 {
                let p = 1.0 + (k as f64 * 0.253) % 250.0;
                acc += u.sample(1.5, 0.0, p, 254.0 - p).unwrap();
            }
            black_box(acc)
        });
    });
}

criterion_group!(benches, bench_sample_resident, bench_sample_sweep);
criterion_main!(benches);
