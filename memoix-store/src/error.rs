//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record could not be converted to or from its document form.
    #[error("record conversion error: {0}")]
    Record(#[from] memoix_types::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data read back from storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A connection lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// A blocking storage task failed to complete.
    #[error("storage task failed: {0}")]
    Task(String),
}
