//! Per-entity status codes and recoverable error kinds.

use std::fmt;

/// Classification of a per-entity failure, used to pick a recovery
/// function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Sampled outside the horizontal (or lower vertical) extent of a grid.
    OutOfBounds,
    /// Sampled above the first vertical level.
    ThroughSurface,
    /// Sampled at a time the resident window cannot cover and the field
    /// does not allow extrapolation.
    TimeExtrapolation,
    /// The interpolation stencil produced no usable value.
    Interpolation,
    /// A user-defined failure raised by a kernel.
    Custom(u32),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "out of bounds"),
            Self::ThroughSurface => write!(f, "through surface"),
            Self::TimeExtrapolation => write!(f, "time extrapolation"),
            Self::Interpolation => write!(f, "interpolation"),
            Self::Custom(code) => write!(f, "custom error {code}"),
        }
    }
}

/// Execution status of one entity within an engine step.
///
/// `Evaluate` and `Success` are the done states for a step. `Repeat`,
/// `Delete` and `StopExecution` are control outcomes the engine acts on;
/// `Error` carries a recoverable failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Needs (more) evaluation.
    Evaluate,
    /// Reached the target time for this step.
    Success,
    /// Retry the last sub-step from the backed-up state.
    Repeat,
    /// Remove from the set after flushing to output.
    Delete,
    /// Abort the whole `execute` call after the current pass.
    StopExecution,
    /// Failed with a recoverable error.
    Error(ErrorKind),
}

impl Status {
    /// `true` for `Success` and `Evaluate`: nothing left to do this step.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Success | Self::Evaluate)
    }

    /// `true` if the status carries a recoverable error.
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The error kind, if any.
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            Self::Error(kind) => Some(kind),
            _ => None,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::Evaluate
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluate => write!(f, "evaluate"),
            Self::Success => write!(f, "success"),
            Self::Repeat => write!(f, "repeat"),
            Self::Delete => write!(f, "delete"),
            Self::StopExecution => write!(f, "stop execution"),
            Self::Error(kind) => write!(f, "error: {kind}"),
        }
    }
}
