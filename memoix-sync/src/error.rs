//! Error types for the sync layer.

use memoix_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed remote data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote storage error (provider side: file system, quota, ...).
    #[error("storage error: {0}")]
    Storage(String),

    /// Local store error.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    /// A record could not be converted to or from its document form.
    #[error("record error: {0}")]
    Record(#[from] memoix_types::Error),

    /// Authentication error (expired or revoked credentials).
    #[error("authentication error: {0}")]
    Auth(String),

    /// The remote folder exists but cannot be read, or does not exist.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// No storage provider is connected.
    #[error("no storage provider connected")]
    NotConnected,

    /// Provider id not in the registry.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The requested sync mode is not supported by the active provider.
    #[error("unsupported sync mode: {0}")]
    UnsupportedMode(String),

    /// A repository switch is already running.
    #[error("a repository switch is already in progress")]
    SwitchInProgress,

    /// No repository with the given id.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// Some domains failed to merge; the others were kept.
    #[error("merge failed for {}", failed.join(", "))]
    PartialMerge { failed: Vec<String> },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Whether retrying the same call can reasonably succeed.
    ///
    /// Credential, permission, configuration and data errors fail fast;
    /// only transport-level failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Storage(_) | SyncError::Timeout
        )
    }
}
