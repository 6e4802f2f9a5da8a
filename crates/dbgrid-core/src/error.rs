//! Error types for dbgrid

use thiserror::Error;

/// Core error type for table cache operations
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch in column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("View index is stale (mapped at revision {mapped}, model is at {current})")]
    StaleIndex { mapped: u64, current: u64 },

    #[error("Model mutated from inside a change notification")]
    ReentrantMutation,

    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
