//! Drift: out-of-core particle tracking through windowed, chunked fields.
//!
//! This is the facade crate re-exporting the public API of the drift
//! sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use drift::prelude::*;
//!
//! // A store where every velocity component is 0.25 everywhere.
//! struct Steady;
//! struct SteadyReader(usize);
//!
//! impl BackingStore for Steady {
//!     fn open_time_slice(&self, time_index: usize) -> Result<Arc<dyn SnapshotReader>, LoadError> {
//!         Ok(Arc::new(SteadyReader(time_index)))
//!     }
//! }
//!
//! impl SnapshotReader for SteadyReader {
//!     fn time_index(&self) -> usize {
//!         self.0
//!     }
//!     fn read_block(&self, extent: &BlockExtent) -> Result<Block, LoadError> {
//!         Block::new(*extent, vec![0.25; extent.cell_count()]).ok_or(LoadError::Io {
//!             reason: "bad block".into(),
//!         })
//!     }
//! }
//!
//! let axis: Vec<f64> = (0..8).map(|i| i as f64).collect();
//! let index = GridIndex::new(axis.clone(), axis, vec![0.0], vec![0.0, 10.0, 20.0], [1, 4, 4]).unwrap();
//! let grid = Arc::new(Grid::new(index));
//!
//! let mut fields = FieldSet::new();
//! for name in ["U", "V"] {
//!     let field = Field::builder(name)
//!         .grid(Arc::clone(&grid))
//!         .store(Arc::new(Steady))
//!         .build()
//!         .unwrap();
//!     fields.add_field(field).unwrap();
//! }
//!
//! let advect = kernel_fn("advect", |e: &mut Entity, ctx: &KernelContext<'_>, t: f64| {
//!     let u = ctx.sample("U", t, e.z, e.y, e.x)?;
//!     let v = ctx.sample("V", t, e.z, e.y, e.x)?;
//!     e.x += u * e.dt;
//!     e.y += v * e.dt;
//!     Ok(())
//! });
//! let engine = ExecutionEngine::new(advect, EngineConfig::default()).unwrap();
//!
//! let mut entities = EntitySet::new();
//! entities.release(0.0, 0.0, 2.0, 2.0);
//! let mut sim = Simulation::new(engine, fields, entities, SimulationConfig::new(1.0)).unwrap();
//! let summary = sim.run(8.0).unwrap();
//! assert_eq!(summary.time, 8.0);
//! assert_eq!(sim.entities().as_slice()[0].x, 4.0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `drift-core` | IDs, blocks, statuses, errors, store traits |
//! | [`grid`] | `drift-grid` | Axes, block layout, cell search, interpolators |
//! | [`cache`] | `drift-cache` | Per-grid chunk cache and its lifecycle |
//! | [`field`] | `drift-field` | Grids, windowed fields, expressions, field sets |
//! | [`engine`] | `drift-engine` | Entities, kernels, recovery, execution, simulation |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`drift-core`).
///
/// Holds the [`types::BackingStore`] and [`types::SnapshotReader`] traits
/// that data sources implement.
pub use drift_core as types;

/// Structured grids (`drift-grid`).
pub use drift_grid as grid;

/// Chunk cache (`drift-cache`).
///
/// Rarely used directly; every [`field::Grid`] owns one.
pub use drift_cache as cache;

/// Windowed fields (`drift-field`).
pub use drift_field as field;

/// Execution engine and simulation driver (`drift-engine`).
pub use drift_engine as engine;

/// Common imports for drift users.
///
/// ```rust
/// use drift::prelude::*;
/// ```
pub mod prelude {
    pub use drift_core::{
        BackingStore, Block, BlockExtent, EntityId, ErrorKind, EvalError, LoadError,
        SnapshotReader, Status,
    };
    pub use drift_grid::{GridIndex, Interpolator, Linear, Nearest};
    pub use drift_field::{
        Direction, Field, FieldError, FieldExpr, FieldSampler, FieldSet, Grid, VectorField,
    };
    pub use drift_engine::{
        kernel_fn, ChannelSink, EngineConfig, Entity, EntitySet, EntitySink, ExecuteOutcome,
        ExecutionEngine, Kernel, KernelContext, KernelPipeline, RecoveryRegistry, Simulation,
        SimulationConfig,
    };
}
