//! Kernels: the per-entity update functions.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use drift_core::{EvalError, LoadError};
use drift_field::{FieldSampler, FieldSet};

use crate::entity::Entity;

/// An update function applied to one entity per sub-step.
///
/// # Contract
///
/// - Kernels see only their own entity; they must not rely on the order in
///   which entities are processed.
/// - Returning `Ok(())` without touching `entity.status` means success.
///   Control outcomes are requested through [`Entity::delete`],
///   [`Entity::repeat`] and [`Entity::stop`].
/// - A changed `entity.dt` on success turns the step into a retry with the
///   new step.
/// - Sampling errors are returned with `?`; per-entity ones go to recovery,
///   fatal ones abort the run.
pub trait Kernel: Send + Sync {
    /// Name for diagnostics.
    fn name(&self) -> &str;

    /// Advance `entity` by `entity.dt` from `time`.
    fn run(&self, entity: &mut Entity, ctx: &KernelContext<'_>, time: f64) -> Result<(), EvalError>;
}

/// A closure kernel.
pub struct FnKernel<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a [`Kernel`].
pub fn kernel_fn<F>(name: impl Into<String>, f: F) -> FnKernel<F>
where
    F: Fn(&mut Entity, &KernelContext<'_>, f64) -> Result<(), EvalError> + Send + Sync,
{
    FnKernel {
        name: name.into(),
        f,
    }
}

impl<F> Kernel for FnKernel<F>
where
    F: Fn(&mut Entity, &KernelContext<'_>, f64) -> Result<(), EvalError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, entity: &mut Entity, ctx: &KernelContext<'_>, time: f64) -> Result<(), EvalError> {
        (self.f)(entity, ctx, time)
    }
}

/// Kernels run in sequence as one kernel.
///
/// Once a kernel changes the entity's status, the remaining kernels are
/// skipped for that sub-step.
#[derive(Clone, Default)]
pub struct KernelPipeline {
    name: String,
    kernels: Vec<Arc<dyn Kernel>>,
}

impl KernelPipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a kernel.
    pub fn then(mut self, kernel: impl Kernel + 'static) -> Self {
        self.push(Arc::new(kernel));
        self
    }

    /// Append a shared kernel.
    pub fn push(&mut self, kernel: Arc<dyn Kernel>) {
        if self.name.is_empty() {
            self.name = kernel.name().to_string();
        } else {
            self.name = format!("{}+{}", self.name, kernel.name());
        }
        self.kernels.push(kernel);
    }

    /// Number of kernels.
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Whether the pipeline has no kernels.
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

impl Kernel for KernelPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, entity: &mut Entity, ctx: &KernelContext<'_>, time: f64) -> Result<(), EvalError> {
        let start = entity.status;
        for k in &self.kernels {
            k.run(entity, ctx, time)?;
            if entity.status != start {
                break;
            }
        }
        Ok(())
    }
}

/// What a kernel can see besides its entity.
pub struct KernelContext<'a> {
    fields: &'a FieldSet,
    seed: u64,
    step: u64,
    pass: u32,
}

impl<'a> KernelContext<'a> {
    pub(crate) fn new(fields: &'a FieldSet, seed: u64, step: u64, pass: u32) -> Self {
        Self {
            fields,
            seed,
            step,
            pass,
        }
    }

    /// The field set.
    pub fn fields(&self) -> &'a FieldSet {
        self.fields
    }

    /// A named constant.
    pub fn constant(&self, name: &str) -> Option<f64> {
        self.fields.constant(name)
    }

    /// Recovery pass number within the current `execute` call (0 for the
    /// batch pass).
    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Sample a field or expression by name.
    pub fn sample(&self, name: &str, t: f64, z: f64, y: f64, x: f64) -> Result<f64, EvalError> {
        self.sampler(name)?.sample(t, z, y, x)
    }

    /// Sample a field or expression at the entity's position and time.
    pub fn sample_at(&self, name: &str, entity: &Entity) -> Result<f64, EvalError> {
        self.sample(name, entity.time, entity.z, entity.y, entity.x)
    }

    /// Sample a vector field by name.
    pub fn sample_vector(
        &self,
        name: &str,
        t: f64,
        z: f64,
        y: f64,
        x: f64,
    ) -> Result<(f64, f64, f64), EvalError> {
        let vector = self
            .fields
            .vector(name)
            .ok_or_else(|| unknown(name))?;
        vector.sample(t, z, y, x)
    }

    fn sampler(&self, name: &str) -> Result<&'a dyn FieldSampler, EvalError> {
        self.fields.sampler(name).ok_or_else(|| unknown(name))
    }

    /// A random source private to `entity` at its current time.
    ///
    /// Seeded from the engine seed, the `execute` call, the pass, the
    /// entity id and its time, so draws do not depend on scheduling.
    pub fn rng(&self, entity: &Entity) -> ChaCha8Rng {
        let mut h = self.seed ^ 0x9E37_79B9_7F4A_7C15;
        for v in [
            self.step,
            u64::from(self.pass),
            entity.id.0,
            entity.time.to_bits(),
        ] {
            h = (h ^ v).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            h ^= h >> 31;
        }
        ChaCha8Rng::seed_from_u64(h)
    }
}

fn unknown(name: &str) -> EvalError {
    EvalError::Fatal(LoadError::UnknownField {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_core::{EntityId, Status};
    use rand::Rng;

    fn entity() -> Entity {
        Entity::new(EntityId(3), 0.0, 0.0, 0.0, 0.0)
    }

    #[test]
    fn pipeline_stops_after_status_change() {
        let p = KernelPipeline::new()
            .then(kernel_fn("mark", |e: &mut Entity, _: &KernelContext<'_>, _| {
                e.x += 1.0;
                e.delete();
                Ok(())
            }))
            .then(kernel_fn("never", |e: &mut Entity, _: &KernelContext<'_>, _| {
                e.x += 100.0;
                Ok(())
            }));
        assert_eq!(p.name(), "mark+never");
        let fs = FieldSet::new();
        let ctx = KernelContext::new(&fs, 0, 0, 0);
        let mut e = entity();
        p.run(&mut e, &ctx, 0.0).unwrap();
        assert_eq!(e.x, 1.0);
        assert_eq!(e.status, Status::Delete);
    }

    #[test]
    fn unknown_field_is_fatal() {
        let fs = FieldSet::new();
        let ctx = KernelContext::new(&fs, 0, 0, 0);
        let err = ctx.sample_at("U", &entity()).unwrap_err();
        assert!(matches!(err, EvalError::Fatal(LoadError::UnknownField { .. })));
    }

    #[test]
    fn rng_is_deterministic_per_entity_and_time() {
        let fs = FieldSet::new();
        let ctx = KernelContext::new(&fs, 42, 1, 0);
        let a: u64 = ctx.rng(&entity()).random();
        let b: u64 = ctx.rng(&entity()).random();
        assert_eq!(a, b);

        let mut later = entity();
        later.time = 1.0;
        let c: u64 = ctx.rng(&later).random();
        assert_ne!(a, c);

        let other = KernelContext::new(&fs, 42, 1, 1);
        let d: u64 = other.rng(&entity()).random();
        assert_ne!(a, d);
    }
}
