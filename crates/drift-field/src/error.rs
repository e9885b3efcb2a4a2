//! Field configuration and loading errors.

use std::fmt;

use drift_core::LoadError;
use drift_grid::GridError;

/// Errors from building fields and field sets, or from pushing their
/// windows forward. All are fatal to a run.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    /// The grid description is invalid.
    Grid(GridError),
    /// A window size outside the supported range.
    InvalidWindowSize {
        /// Requested size.
        requested: usize,
    },
    /// A field parameter is inconsistent.
    InvalidParams {
        /// Field name.
        field: String,
        /// What is wrong.
        reason: String,
    },
    /// A builder was finished without a required part.
    Incomplete {
        /// Field name.
        field: String,
        /// Missing part.
        missing: &'static str,
    },
    /// A name is already registered in the field set.
    DuplicateName {
        /// The name.
        name: String,
    },
    /// A name that nothing is registered under.
    UnknownName {
        /// The name.
        name: String,
    },
    /// A composite expression with no children.
    EmptyExpression,
    /// The data cannot cover the requested time in the direction of travel.
    TimeExtrapolation {
        /// Field name.
        field: String,
        /// Requested time.
        time: f64,
    },
    /// The backing store failed.
    Load(LoadError),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid(e) => write!(f, "invalid grid: {e}"),
            Self::InvalidWindowSize { requested } => {
                write!(f, "window size must be 2 or 3, got {requested}")
            }
            Self::InvalidParams { field, reason } => {
                write!(f, "invalid parameters for field '{field}': {reason}")
            }
            Self::Incomplete { field, missing } => {
                write!(f, "field '{field}' has no {missing}")
            }
            Self::DuplicateName { name } => write!(f, "name '{name}' is already registered"),
            Self::UnknownName { name } => write!(f, "no field named '{name}'"),
            Self::EmptyExpression => write!(f, "composite field has no children"),
            Self::TimeExtrapolation { field, time } => {
                write!(f, "field '{field}' cannot be advanced past time {time}")
            }
            Self::Load(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for FieldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Grid(e) => Some(e),
            Self::Load(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for FieldError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

impl From<LoadError> for FieldError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}
