//! The execution engine: batch pass, recovery loop and per-entity
//! sub-stepping.
//!
//! One `execute` call advances every entity to `end_time`, in segments
//! that end at the next snapshot boundary of the field set. Each segment:
//!
//! 1. Resets every status to `Evaluate`, starts a step on every grid and
//!    pushes every field window to cover the segment
//!    ([`FieldSet::advance_time`]).
//! 2. Runs the kernel over the whole set (the batch pass, parallel when
//!    configured). Each entity sub-steps by its `dt` until it reaches the
//!    segment end or gets another status.
//! 3. Flushes and removes `Delete` entities.
//! 4. While any entity is `Repeat`, failed or stopping: stops the call on
//!    `StopExecution`; resets `Repeat` to `Evaluate`; sends failures
//!    through the [`RecoveryRegistry`] (deleting the unhandled ones);
//!    flushes deletes; reruns the kernel pass.
//! 5. Ends the step on every grid.
//!
//! Per-entity failures never leave their entity. Backing-store failures
//! and windows that cannot be advanced abort the call.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use drift_core::{EvalError, LoadError, Status};
use drift_field::{FieldError, FieldSet};

use crate::config::{ConfigError, EngineConfig};
use crate::entity::{Entity, EntitySet};
use crate::kernel::{Kernel, KernelContext};
use crate::metrics::ExecuteMetrics;
use crate::output::{EntitySink, OutputError};
use crate::recovery::RecoveryRegistry;

/// How an `execute` call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Every remaining entity reached `end_time` or a done state.
    Completed,
    /// An entity requested `StopExecution`; other entities keep the status
    /// they had.
    Stopped,
}

/// Result of a successful `execute` call.
#[derive(Clone, Debug)]
pub struct ExecuteResult {
    /// How the call ended.
    pub outcome: ExecuteOutcome,
    /// Timings and counters.
    pub metrics: ExecuteMetrics,
}

/// Fatal failures of an `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteError {
    /// A block or snapshot could not be loaded.
    Fatal(LoadError),
    /// A field window could not be advanced to cover a segment.
    Field(FieldError),
    /// The output sink failed.
    Output(OutputError),
}

impl fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal(e) => write!(f, "execution aborted: {e}"),
            Self::Field(e) => write!(f, "execution aborted: {e}"),
            Self::Output(e) => write!(f, "execution aborted: {e}"),
        }
    }
}

impl Error for ExecuteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fatal(e) => Some(e),
            Self::Field(e) => Some(e),
            Self::Output(e) => Some(e),
        }
    }
}

impl From<LoadError> for ExecuteError {
    fn from(e: LoadError) -> Self {
        Self::Fatal(e)
    }
}

impl From<FieldError> for ExecuteError {
    fn from(e: FieldError) -> Self {
        match e {
            FieldError::Load(e) => Self::Fatal(e),
            e => Self::Field(e),
        }
    }
}

impl From<OutputError> for ExecuteError {
    fn from(e: OutputError) -> Self {
        Self::Output(e)
    }
}

/// Equal up to a relative tolerance of 1e-5.
fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-5 * a.abs().max(b.abs())
}

/// `v` is rounding noise next to a step of size `step`.
fn negligible(v: f64, step: f64) -> bool {
    v.abs() <= 1e-8 * step.abs()
}

/// -1, 0 or 1.
fn sign_of(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Runs a kernel over an entity set with per-entity recovery.
pub struct ExecutionEngine {
    config: EngineConfig,
    kernel: Arc<dyn Kernel>,
    recovery: RecoveryRegistry,
    steps: AtomicU64,
    warned_precision: AtomicBool,
    warned_unrecoverable: AtomicBool,
}

// Shared by rayon workers during a pass.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ExecutionEngine>();
};

impl ExecutionEngine {
    /// An engine running `kernel` with default recovery handlers.
    pub fn new(kernel: impl Kernel + 'static, config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_shared_kernel(Arc::new(kernel), config)
    }

    /// An engine running a shared kernel.
    pub fn with_shared_kernel(
        kernel: Arc<dyn Kernel>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            kernel,
            recovery: RecoveryRegistry::with_defaults(),
            steps: AtomicU64::new(0),
            warned_precision: AtomicBool::new(false),
            warned_unrecoverable: AtomicBool::new(false),
        })
    }

    /// Replace the recovery registry.
    pub fn with_recovery(mut self, recovery: RecoveryRegistry) -> Self {
        self.recovery = recovery;
        self
    }

    /// The recovery registry, for registering handlers.
    pub fn recovery_mut(&mut self) -> &mut RecoveryRegistry {
        &mut self.recovery
    }

    /// The recovery registry.
    pub fn recovery(&self) -> &RecoveryRegistry {
        &self.recovery
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The kernel's name.
    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    /// Advance every entity to `end_time` in steps of `dt`.
    ///
    /// Entities whose own `dt` is zero or points against `dt` adopt `dt`;
    /// others keep their (possibly adaptive) step. The call starts at the
    /// earliest entity time and stops at every snapshot boundary on the
    /// way to push the field windows forward. Deleted entities are flushed
    /// to `sink` at the end of the segment they were deleted in, before
    /// removal.
    pub fn execute(
        &self,
        entities: &mut EntitySet,
        fields: &FieldSet,
        end_time: f64,
        dt: f64,
        sink: Option<&mut dyn EntitySink>,
    ) -> Result<ExecuteResult, ExecuteError> {
        if dt.abs() < self.config.dt_epsilon && !self.warned_precision.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                dt,
                epsilon = self.config.dt_epsilon,
                "time step is below the precision threshold"
            );
        }
        self.execute_inner(entities, fields, end_time, dt, sink)
    }

    /// Evaluate every entity once at its current time, with `dt = 0`.
    ///
    /// Positions are not advanced by the engine. Entity steps are kept.
    pub fn execute_once(
        &self,
        entities: &mut EntitySet,
        fields: &FieldSet,
        time: f64,
        sink: Option<&mut dyn EntitySink>,
    ) -> Result<ExecuteResult, ExecuteError> {
        self.execute_inner(entities, fields, time, 0.0, sink)
    }

    fn execute_inner(
        &self,
        entities: &mut EntitySet,
        fields: &FieldSet,
        end_time: f64,
        dt: f64,
        mut sink: Option<&mut dyn EntitySink>,
    ) -> Result<ExecuteResult, ExecuteError> {
        let started = Instant::now();
        let mut metrics = ExecuteMetrics {
            entities_evaluated: entities.len(),
            ..ExecuteMetrics::default()
        };

        let sign = sign_of(dt);
        if sign != 0.0 {
            for e in entities.as_mut_slice() {
                if sign_of(e.dt) != sign {
                    e.dt = dt;
                }
            }
        }

        let mut from = earliest_time(entities, sign).unwrap_or(end_time);
        let outcome = loop {
            let step = self.steps.fetch_add(1, Ordering::Relaxed);
            for e in entities.as_mut_slice() {
                e.reset_status();
            }
            fields.begin_step();
            let segment = match segment_end(fields, from, end_time, dt) {
                Ok(to) => self
                    .run_step(entities, fields, to, dt, sink.as_deref_mut(), step, &mut metrics)
                    .map(|outcome| (to, outcome)),
                Err(e) => Err(e.into()),
            };
            metrics.evicted += fields.end_step();
            let (to, outcome) = segment?;
            metrics.segments += 1;
            if outcome == ExecuteOutcome::Stopped || to == end_time {
                break outcome;
            }
            tracing::debug!(from, to, "segment reached a snapshot boundary");
            from = to;
        };
        metrics.cache = fields.cache_stats();
        metrics.total_us = started.elapsed().as_micros() as u64;

        Ok(ExecuteResult { outcome, metrics })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_step(
        &self,
        entities: &mut EntitySet,
        fields: &FieldSet,
        end_time: f64,
        dt: f64,
        mut sink: Option<&mut (dyn EntitySink + '_)>,
        step: u64,
        metrics: &mut ExecuteMetrics,
    ) -> Result<ExecuteOutcome, ExecuteError> {
        let ctx = KernelContext::new(fields, self.config.seed, step, 0);
        self.run_pass(entities, &ctx, end_time, dt, metrics)?;
        flush_deleted(entities, sink.as_deref_mut(), end_time, metrics)?;

        let mut pass = 0u32;
        loop {
            let pending = entities
                .iter()
                .filter(|e| !e.status.is_done())
                .count();
            if pending == 0 {
                return Ok(ExecuteOutcome::Completed);
            }
            if let Some(stopper) = entities
                .iter()
                .find(|e| e.status == Status::StopExecution)
            {
                tracing::info!(
                    entity = %stopper.id,
                    time = stopper.time,
                    pass,
                    "execution stopped by entity"
                );
                return Ok(ExecuteOutcome::Stopped);
            }
            if self.config.max_recovery_passes.is_some_and(|cap| pass >= cap) {
                self.force_delete(entities, metrics);
                flush_deleted(entities, sink.as_deref_mut(), end_time, metrics)?;
                return Ok(ExecuteOutcome::Completed);
            }

            pass += 1;
            tracing::debug!(pass, pending, "recovery pass");
            let ctx = KernelContext::new(fields, self.config.seed, step, pass);
            self.recover(entities, &ctx, metrics);
            flush_deleted(entities, sink.as_deref_mut(), end_time, metrics)?;
            self.run_pass(entities, &ctx, end_time, dt, metrics)?;
            flush_deleted(entities, sink.as_deref_mut(), end_time, metrics)?;
        }
    }

    fn run_pass(
        &self,
        entities: &mut EntitySet,
        ctx: &KernelContext<'_>,
        end_time: f64,
        dt: f64,
        metrics: &mut ExecuteMetrics,
    ) -> Result<(), LoadError> {
        let started = Instant::now();
        // Entities not yet reached when one requests a stop keep their status.
        let stopping = AtomicBool::new(false);
        let eval = |e: &mut Entity| -> Result<(), LoadError> {
            if stopping.load(Ordering::Relaxed) {
                return Ok(());
            }
            self.evaluate_entity(e, ctx, end_time, dt)?;
            if e.status == Status::StopExecution {
                stopping.store(true, Ordering::Relaxed);
            }
            Ok(())
        };
        let slice = entities.as_mut_slice();
        let result = if self.config.parallel {
            slice.par_iter_mut().try_for_each(eval)
        } else {
            slice.iter_mut().try_for_each(eval)
        };
        metrics.kernel_us += started.elapsed().as_micros() as u64;
        metrics.passes += 1;
        result
    }

    fn recover(&self, entities: &mut EntitySet, ctx: &KernelContext<'_>, metrics: &mut ExecuteMetrics) {
        let started = Instant::now();
        for e in entities.as_mut_slice() {
            match e.status {
                Status::Repeat => {
                    e.reset_status();
                    metrics.repeats += 1;
                }
                Status::Error(kind) => match self.recovery.get(kind) {
                    Some(handler) => {
                        e.status = Status::Success;
                        let time = e.time;
                        handler(e, ctx, time);
                        metrics.recovered += 1;
                        if e.is_computed() {
                            e.reset_status();
                        }
                    }
                    None => {
                        if !self.warned_unrecoverable.swap(true, Ordering::Relaxed) {
                            tracing::warn!(
                                entity = %e.id,
                                error = %kind,
                                detail = e.last_error().unwrap_or(""),
                                "deleting entity with an unrecoverable error"
                            );
                        }
                        e.delete();
                        metrics.forced_deletions += 1;
                    }
                },
                _ => {}
            }
        }
        metrics.recovery_us += started.elapsed().as_micros() as u64;
    }

    fn force_delete(&self, entities: &mut EntitySet, metrics: &mut ExecuteMetrics) {
        let mut n = 0;
        for e in entities.as_mut_slice() {
            if !e.status.is_done() && e.status != Status::Delete {
                e.delete();
                n += 1;
            }
        }
        metrics.forced_deletions += n;
        tracing::warn!(
            deleted = n,
            cap = self.config.max_recovery_passes,
            "recovery pass limit reached; deleting unresolved entities"
        );
    }

    /// Sub-step one entity towards `end_time`.
    fn evaluate_entity(
        &self,
        e: &mut Entity,
        ctx: &KernelContext<'_>,
        end_time: f64,
        dt: f64,
    ) -> Result<(), LoadError> {
        let sign = sign_of(dt);
        let single = dt == 0.0;
        let entry_dt = e.dt;
        let mut nominal = e.dt.abs();
        let mut dt_pos = nominal.min((end_time - e.time).abs());

        if !single {
            let remaining = end_time - e.time;
            if sign_of(remaining) != sign || nominal == 0.0 || negligible(remaining, nominal) {
                e.status = Status::Success;
                return Ok(());
            }
        }

        while matches!(e.status, Status::Evaluate | Status::Repeat) {
            let backup = e.backup();
            let pre = sign * dt_pos;
            let reaches_end = !single && (end_time - e.time).abs() <= nominal;
            let prev = e.status;
            e.dt = pre;
            let time = e.time;

            let res = match self.kernel.run(e, ctx, time) {
                Ok(()) => {
                    let res = if e.status != prev {
                        e.status
                    } else {
                        Status::Success
                    };
                    if res == Status::Success && !is_close(e.dt, pre) {
                        Status::Repeat
                    } else {
                        res
                    }
                }
                Err(EvalError::Entity(err)) => {
                    e.set_last_error(err.detail);
                    Status::Error(err.kind)
                }
                Err(EvalError::Fatal(err)) => return Err(err),
            };

            let kept_step = is_close(e.dt, pre);
            if matches!(res, Status::Success | Status::Delete) {
                if reaches_end && kept_step {
                    e.time = end_time;
                } else {
                    e.time += e.dt;
                }
                if single {
                    e.status = res;
                    e.dt = entry_dt;
                    break;
                }
                if kept_step {
                    e.dt = sign * nominal;
                }
                e.apply_next_dt();
                nominal = e.dt.abs();
                let remaining = end_time - e.time;
                dt_pos = nominal.min(remaining.abs());
                e.status = if res != Status::Delete
                    && nominal > 0.0
                    && !negligible(remaining, nominal)
                    && sign_of(remaining) == sign
                {
                    Status::Evaluate
                } else {
                    res
                };
            } else {
                e.status = res;
                e.restore(backup);
                if single {
                    e.dt = entry_dt;
                } else if kept_step {
                    e.dt = sign * nominal;
                }
                break;
            }
        }
        Ok(())
    }
}

/// Earliest entity time along the direction of travel.
fn earliest_time(entities: &EntitySet, sign: f64) -> Option<f64> {
    let times = entities.iter().map(|e| e.time);
    if sign < 0.0 {
        times.reduce(f64::max)
    } else {
        times.reduce(f64::min)
    }
}

/// End of the segment starting at `from`: the next snapshot boundary, or
/// `end_time` when that comes first. Pushes every field window to cover
/// `from` in the direction of travel.
fn segment_end(fields: &FieldSet, from: f64, end_time: f64, dt: f64) -> Result<f64, FieldError> {
    let sign = sign_of(dt);
    if sign == 0.0 || (end_time - from) * sign <= 0.0 {
        return Ok(end_time);
    }
    let boundary = fields.advance_time(from, dt)?;
    if (boundary - from) * sign > 0.0 && (boundary - end_time) * sign < 0.0 {
        Ok(boundary)
    } else {
        Ok(end_time)
    }
}

fn flush_deleted(
    entities: &mut EntitySet,
    sink: Option<&mut (dyn EntitySink + '_)>,
    time: f64,
    metrics: &mut ExecuteMetrics,
) -> Result<(), OutputError> {
    let gone = entities.take_deleted();
    if gone.is_empty() {
        return Ok(());
    }
    metrics.deleted += gone.len();
    tracing::debug!(count = gone.len(), time, "flushing deleted entities");
    match sink {
        Some(sink) => sink.flush(&gone, time),
        None => Ok(()),
    }
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("kernel", &self.kernel.name())
            .field("config", &self.config)
            .field("recovery", &self.recovery)
            .finish()
    }
}
