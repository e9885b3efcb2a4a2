//! Chunk lifecycle states and their transitions.

/// Lifecycle state of one cached block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChunkState {
    /// No payload.
    #[default]
    NotLoaded,
    /// A loader has been elected and is reading the payload.
    LoadRequested,
    /// Resident and touched during the current step.
    LoadedTouched,
    /// Resident, touched last step, not yet touched this step.
    Deprecated,
}

impl ChunkState {
    /// Transition at the start of a step.
    pub fn begin_step(self) -> Self {
        match self {
            Self::LoadedTouched => Self::Deprecated,
            other => other,
        }
    }

    /// Transition when a sample reads the block.
    pub fn touched(self) -> Self {
        Self::LoadedTouched
    }

    /// Transition at the end of a step.
    pub fn end_step(self) -> Self {
        match self {
            Self::Deprecated => Self::NotLoaded,
            other => other,
        }
    }

    /// Whether a payload may be attached in this state.
    pub fn is_resident(self) -> bool {
        matches!(self, Self::LoadedTouched | Self::Deprecated)
    }
}
