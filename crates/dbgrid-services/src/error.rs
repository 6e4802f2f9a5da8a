use dbgrid_core::CoreError;
use thiserror::Error;

pub type EditResult<T> = Result<T, EditError>;

/// Errors from edit, undo and session operations
#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store rejected a write. Any optimistic local change has been
    /// rolled back.
    #[error("Remote write failed: {0}")]
    RemoteFailure(String),

    /// The row a write or undo refers to is no longer in the local snapshot
    #[error("No row matches the given criteria")]
    StaleCriteria,

    /// Several local rows equal the undo target, so an exact-match write
    /// would hit all of them. The entry stays on the log.
    #[error("Undo target matches {matches} identical rows")]
    AmbiguousCriteria { matches: usize },

    #[error("Nothing to undo")]
    EmptyUndoLog,

    #[error("Table not open: {0}")]
    TableNotOpen(String),
}

impl EditError {
    /// Whether the error came back from the store rather than local checks
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::RemoteFailure(_) | Self::Core(CoreError::RemoteFailure(_))
        )
    }
}
