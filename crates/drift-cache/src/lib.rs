//! Block-level chunk cache for drift grids.
//!
//! One [`ChunkCache`] exists per grid and is shared by every field defined
//! on that grid. Each spatial block carries a [`ChunkState`]; the engine
//! drives step boundaries and the sampler drives touches:
//!
//! - `begin_step`: every `LoadedTouched` chunk becomes `Deprecated`.
//! - `touch`: a chunk becomes `LoadedTouched`, loading the requested layer
//!   if it is not resident.
//! - `end_step`: every chunk still `Deprecated` becomes `NotLoaded` and its
//!   payload is freed.
//!
//! A block therefore stays resident as long as it is touched at least once
//! per step, and is gone after two consecutive steps without a touch.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod chunk;

pub use cache::{CacheStats, ChunkCache, LayerKey};
pub use chunk::ChunkState;
