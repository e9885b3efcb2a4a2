//! Grid indexing for drift.
//!
//! A [`GridIndex`] describes the coordinate axes of a gridded dataset and
//! how its spatial extent is cut into rectangular blocks, the unit of lazy
//! loading. It also locates a position inside the grid, producing the
//! [`CellLocation`] that an [`Interpolator`] turns into a value.
//!
//! Spatial indices and block shapes are always ordered `(z, y, x)`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod axis;
pub mod error;
pub mod index;
pub mod interp;

pub use axis::{Axis, AxisPosition};
pub use error::GridError;
pub use index::{CellLocation, GridIndex};
pub use interp::{Interpolator, Linear, Nearest, Stencil};
