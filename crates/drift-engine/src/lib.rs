//! Per-entity execution and recovery for drift.
//!
//! The [`ExecutionEngine`] applies a [`Kernel`] to every entity of an
//! [`EntitySet`], sub-stepping each one to the requested end time. Errors
//! raised while sampling stay with their entity and are resolved by the
//! [`RecoveryRegistry`] between passes; backing-store failures abort the
//! call. [`Simulation`] drives repeated calls across snapshot boundaries
//! and output times.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod entity;
pub mod kernel;
pub mod metrics;
pub mod output;
pub mod recovery;
pub mod simulation;

pub use config::{ConfigError, EngineConfig};
pub use engine::{ExecuteError, ExecuteOutcome, ExecuteResult, ExecutionEngine};
pub use entity::{Entity, EntitySet, Vars};
pub use kernel::{kernel_fn, FnKernel, Kernel, KernelContext, KernelPipeline};
pub use metrics::ExecuteMetrics;
pub use output::{ChannelSink, EntitySink, OutputBatch, OutputError};
pub use recovery::{delete_with_warning, RecoveryFn, RecoveryRegistry};
pub use simulation::{RunSummary, Simulation, SimulationConfig, SimulationError};
