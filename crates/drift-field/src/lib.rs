//! Windowed, time-varying fields for drift.
//!
//! A [`Field`] reads a variable from a [`BackingStore`](drift_core::BackingStore)
//! on a shared [`Grid`]. Only a small window of snapshots is open at a
//! time ([`TimeWindowBuffer`]); only the blocks that sampling touches are
//! loaded, through the grid's [`ChunkCache`](drift_cache::ChunkCache).
//!
//! Sampling pulls data: a sample at a time outside the window advances it
//! lazily. [`FieldSet::advance_time`] pushes all windows forward before a
//! run segment and tells the caller how far it may step.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod expr;
pub mod field;
pub mod fieldset;
pub mod grid;
pub mod sampler;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use error::FieldError;
pub use expr::{FieldExpr, VectorField};
pub use field::{Field, FieldBuilder, FieldParams};
pub use fieldset::FieldSet;
pub use grid::{Direction, Grid, UpdateStatus, WindowPosition, DEFAULT_WINDOW_SIZE};
pub use sampler::FieldSampler;
pub use window::TimeWindowBuffer;
