//! Grid construction errors.

use std::fmt;

/// Errors arising from grid construction. Always a configuration problem,
/// so always fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// An axis has no values.
    EmptyAxis {
        /// Axis name.
        axis: &'static str,
    },
    /// An axis value is NaN or infinite.
    NonFiniteAxis {
        /// Axis name.
        axis: &'static str,
        /// Position of the offending value.
        index: usize,
    },
    /// An axis is not strictly increasing.
    NonMonotonicAxis {
        /// Axis name.
        axis: &'static str,
        /// Position of the first value not greater than its predecessor.
        index: usize,
    },
    /// A block shape component is zero.
    ZeroBlockShape {
        /// Axis name.
        axis: &'static str,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAxis { axis } => write!(f, "axis '{axis}' has no values"),
            Self::NonFiniteAxis { axis, index } => {
                write!(f, "axis '{axis}' has a non-finite value at {index}")
            }
            Self::NonMonotonicAxis { axis, index } => {
                write!(f, "axis '{axis}' is not strictly increasing at {index}")
            }
            Self::ZeroBlockShape { axis } => {
                write!(f, "block shape along '{axis}' must be at least 1")
            }
        }
    }
}

impl std::error::Error for GridError {}
