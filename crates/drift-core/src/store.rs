//! Backing-store traits: the read side of a gridded dataset.
//!
//! The core is format-agnostic. A store opens one time slice at a time;
//! the returned reader hands out spatial blocks on demand. Readers are
//! shared behind `Arc` so a sampling thread can read a block without
//! holding any window lock.

use std::sync::Arc;

use crate::block::{Block, BlockExtent};
use crate::error::LoadError;

/// Opens time slices of one field's dataset.
pub trait BackingStore: Send + Sync {
    /// Open the snapshot at global time index `time_index`.
    fn open_time_slice(&self, time_index: usize) -> Result<Arc<dyn SnapshotReader>, LoadError>;
}

/// An open time slice with block-addressable reads.
pub trait SnapshotReader: Send + Sync {
    /// The global time index this reader serves.
    fn time_index(&self) -> usize;

    /// Read the values of one spatial block.
    fn read_block(&self, extent: &BlockExtent) -> Result<Block, LoadError>;

    /// Release the underlying resource. Called once when the window slot
    /// holding this reader is vacated.
    fn close(&self) {}
}
