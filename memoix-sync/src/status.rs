//! Observable sync state and operation outcomes.

use crate::merge::MergeResult;
use memoix_types::StorageMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the coordinator is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Pushing,
    Pulling,
    /// The last operation failed. Cleared when the next one starts.
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Pushing => "pushing",
            SyncStatus::Pulling => "pulling",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-facing message (toast) about a finished operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNotice {
    pub level: NoticeLevel,
    pub message: String,
}

impl SyncNotice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Result of [`SyncCoordinator::push`](crate::SyncCoordinator::push).
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Bundle and meta were written.
    Pushed(StorageMeta),
    /// Another push was in flight; nothing was done.
    AlreadyRunning,
    /// No storage provider is connected.
    NotConnected,
    /// The push failed after retries.
    Failed(String),
}

impl PushOutcome {
    pub fn is_pushed(&self) -> bool {
        matches!(self, PushOutcome::Pushed(_))
    }
}

/// Why a pull did not merge anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConnected,
    AlreadyRunning,
    /// The remote meta is not newer than the last sync.
    UpToDate,
    /// The remote folder holds no bundle yet.
    RemoteEmpty,
}

/// Result of [`SyncCoordinator::pull`](crate::SyncCoordinator::pull).
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    Merged(MergeResult),
    Skipped(SkipReason),
    Failed(String),
}
