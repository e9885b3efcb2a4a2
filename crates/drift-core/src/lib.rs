//! Core types and traits for the drift particle-tracking framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other drift crate: typed IDs, spatial
//! blocks, entity status codes, the error taxonomy, and the backing-store
//! traits through which gridded data is read.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod error;
pub mod id;
pub mod status;
pub mod store;

pub use block::{Block, BlockCoord, BlockExtent};
pub use error::{EntityError, EvalError, LoadError};
pub use id::{BlockId, EntityId, FieldId, GridId};
pub use status::{ErrorKind, Status};
pub use store::{BackingStore, SnapshotReader};
