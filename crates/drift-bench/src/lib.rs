//! Benchmark profiles for drift.
//!
//! - [`gyre_fields`]: a steady two-component flow on an `n x n` grid, with
//!   `nt` snapshots split into `block x block` chunks.
//! - [`seed_entities`]: deterministic entity placement via seed.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use drift_engine::EntitySet;
use drift_field::{Field, FieldSet};
use drift_test_utils::{uniform_grid, MemoryStore};

/// Fields `U` and `V` of a closed gyre on `x, y in [0, n)`, one snapshot
/// per unit time.
pub fn gyre_fields(n: usize, nt: usize, block: usize) -> FieldSet {
    let times = (0..nt).map(|t| t as f64).collect();
    let grid = uniform_grid(n, n, 1, times, [1, block, block]);
    let scale = std::f32::consts::PI / n as f32;
    let u = MemoryStore::new(nt, move |_, _, j, i| {
        -(scale * i as f32).sin() * (scale * j as f32).cos()
    });
    let v = MemoryStore::new(nt, move |_, _, j, i| {
        (scale * i as f32).cos() * (scale * j as f32).sin()
    });

    let mut fields = FieldSet::new();
    for (name, store) in [("U", u), ("V", v)] {
        let field = Field::builder(name)
            .grid(Arc::clone(&grid))
            .store(Arc::new(store))
            .build()
            .expect("benchmark field");
        fields.add_field(field).expect("unique field name");
    }
    fields
}

/// `count` entities at time 0, uniformly inside `[1, n - 2]^2`.
pub fn seed_entities(count: usize, n: usize, seed: u64) -> EntitySet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let hi = n as f64 - 2.0;
    let mut set = EntitySet::new();
    for _ in 0..count {
        let x = rng.random_range(1.0..hi);
        let y = rng.random_range(1.0..hi);
        set.release(0.0, 0.0, y, x);
    }
    set
}
