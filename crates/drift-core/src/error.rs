//! Error types shared across drift crates.
//!
//! Two families: [`LoadError`] is fatal and aborts a run; [`EntityError`]
//! is attached to a single entity and resolved through recovery.
//! [`EvalError`] is what sampling and kernels return, so either can be
//! propagated with `?`.

use std::error::Error;
use std::fmt;

use crate::block::BlockCoord;
use crate::status::ErrorKind;

/// A fatal data-access failure. Never recoverable per entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The store could not be read.
    Io {
        /// Description of the failure.
        reason: String,
    },
    /// A block was read but its contents are unusable.
    CorruptBlock {
        /// The offending block.
        block: BlockCoord,
        /// Time index of the snapshot it belongs to.
        time_index: usize,
        /// Description of the corruption.
        reason: String,
    },
    /// No snapshot exists at the requested time index.
    MissingSnapshot {
        /// The requested time index.
        time_index: usize,
    },
    /// A kernel asked for a field the field set does not hold.
    UnknownField {
        /// The requested name.
        name: String,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { reason } => write!(f, "backing store i/o failed: {reason}"),
            Self::CorruptBlock {
                block,
                time_index,
                reason,
            } => write!(
                f,
                "corrupt block ({}, {}, {}) at time index {time_index}: {reason}",
                block.z, block.y, block.x
            ),
            Self::MissingSnapshot { time_index } => {
                write!(f, "no snapshot at time index {time_index}")
            }
            Self::UnknownField { name } => write!(f, "no field named '{name}'"),
        }
    }
}

impl Error for LoadError {}

/// A recoverable failure attached to one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityError {
    /// The kind used to look up a recovery function.
    pub kind: ErrorKind,
    /// Human-readable context (field name, position, time).
    pub detail: String,
}

impl EntityError {
    /// Build an error of `kind` with the given context.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl Error for EntityError {}

/// Result error of a sample or kernel invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalError {
    /// The entity failed; other entities are unaffected.
    Entity(EntityError),
    /// The run must abort.
    Fatal(LoadError),
}

impl EvalError {
    /// Shorthand for a per-entity failure.
    pub fn entity(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Entity(EntityError::new(kind, detail))
    }

    /// Shorthand for a user-defined per-entity failure.
    pub fn custom(code: u32, detail: impl Into<String>) -> Self {
        Self::entity(ErrorKind::Custom(code), detail)
    }

    /// The error kind for per-entity failures, `None` if fatal.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Entity(e) => Some(e.kind),
            Self::Fatal(_) => None,
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(e) => write!(f, "{e}"),
            Self::Fatal(e) => write!(f, "fatal: {e}"),
        }
    }
}

impl Error for EvalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Entity(e) => Some(e),
            Self::Fatal(e) => Some(e),
        }
    }
}

impl From<EntityError> for EvalError {
    fn from(e: EntityError) -> Self {
        Self::Entity(e)
    }
}

impl From<LoadError> for EvalError {
    fn from(e: LoadError) -> Self {
        Self::Fatal(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_none_for_fatal() {
        let e: EvalError = LoadError::MissingSnapshot { time_index: 3 }.into();
        assert_eq!(e.kind(), None);
        assert_eq!(e.to_string(), "fatal: no snapshot at time index 3");
    }

    #[test]
    fn custom_errors_keep_code() {
        let e = EvalError::custom(42, "beached");
        assert_eq!(e.kind(), Some(ErrorKind::Custom(42)));
        assert_eq!(e.to_string(), "custom error 42: beached");
    }
}
