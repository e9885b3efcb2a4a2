//! Reusable kernels for engine and simulation tests.
//!
//! - [`advect_euler`]: forward Euler through a two-component velocity.
//! - [`move_east`]: constant drift along x, no sampling.
//! - [`delete_when`] and [`stop_when`]: control outcomes on a predicate.
//! - [`CountingKernel`]: counts invocations.

use std::sync::atomic::{AtomicUsize, Ordering};

use drift_core::EvalError;
use drift_engine::{kernel_fn, Entity, Kernel, KernelContext};

/// `x += u dt`, `y += v dt` with `u` and `v` sampled by name.
pub fn advect_euler(u: &str, v: &str) -> impl Kernel {
    let (u, v) = (u.to_string(), v.to_string());
    kernel_fn(
        "advect_euler",
        move |e: &mut Entity, ctx: &KernelContext<'_>, t: f64| -> Result<(), EvalError> {
            let du = ctx.sample(&u, t, e.z, e.y, e.x)?;
            let dv = ctx.sample(&v, t, e.z, e.y, e.x)?;
            e.x += du * e.dt;
            e.y += dv * e.dt;
            Ok(())
        },
    )
}

/// `x += speed dt`.
pub fn move_east(speed: f64) -> impl Kernel {
    kernel_fn(
        "move_east",
        move |e: &mut Entity, _ctx: &KernelContext<'_>, _t: f64| -> Result<(), EvalError> {
            e.x += speed * e.dt;
            Ok(())
        },
    )
}

/// Deletes entities matching `pred`.
pub fn delete_when(pred: impl Fn(&Entity) -> bool + Send + Sync + 'static) -> impl Kernel {
    kernel_fn(
        "delete_when",
        move |e: &mut Entity, _ctx: &KernelContext<'_>, _t: f64| -> Result<(), EvalError> {
            if pred(e) {
                e.delete();
            }
            Ok(())
        },
    )
}

/// Stops the run when an entity matches `pred`.
pub fn stop_when(pred: impl Fn(&Entity) -> bool + Send + Sync + 'static) -> impl Kernel {
    kernel_fn(
        "stop_when",
        move |e: &mut Entity, _ctx: &KernelContext<'_>, _t: f64| -> Result<(), EvalError> {
            if pred(e) {
                e.stop();
            }
            Ok(())
        },
    )
}

/// Counts how often it runs and does nothing else.
#[derive(Default)]
pub struct CountingKernel {
    calls: AtomicUsize,
}

impl CountingKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Kernel for CountingKernel {
    fn name(&self) -> &str {
        "counting"
    }

    fn run(&self, _entity: &mut Entity, _ctx: &KernelContext<'_>, _time: f64) -> Result<(), EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
