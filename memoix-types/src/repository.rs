//! Configured remote locations, provider ids and the sync mode.

use crate::{Error, RepositoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed registry of storage provider ids.
///
/// Parsing an id that is not listed here is an error, never a silent `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Drive over the Drive v3 REST API.
    GoogleDrive,
    /// A local directory, typically one kept in sync by a desktop cloud client.
    LocalFolder,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::GoogleDrive, ProviderKind::LocalFolder];

    /// Stable string id, as persisted in settings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "google_drive",
            ProviderKind::LocalFolder => "local_folder",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnknownProvider(s.to_string()))
    }
}

/// Whether syncs are triggered by the user only or also by lifecycle hooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Manual,
    Automatic,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Manual => "manual",
            SyncMode::Automatic => "automatic",
        }
    }

    #[must_use]
    pub const fn is_automatic(&self) -> bool {
        matches!(self, SyncMode::Automatic)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SyncMode::Manual),
            "automatic" => Ok(SyncMode::Automatic),
            other => Err(Error::UnknownSyncMode(other.to_string())),
        }
    }
}

/// A configured remote storage location the app can sync against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: RepositoryId,
    /// Display name.
    pub name: String,
    pub provider: ProviderKind,
    /// Provider-specific folder identifier (a Drive folder id, a path, ...).
    pub folder_id: String,
    #[serde(default)]
    pub is_active: bool,
    /// Set until the app has confirmed it can read the folder.
    #[serde(default)]
    pub is_pending_verification: bool,
    #[serde(default)]
    pub access_denied: bool,
    #[serde(default)]
    pub last_synced: Option<DateTime<Utc>>,
}

impl Repository {
    /// Creates an inactive repository awaiting verification.
    pub fn new(name: impl Into<String>, provider: ProviderKind, folder_id: impl Into<String>) -> Self {
        Self {
            id: RepositoryId::new(),
            name: name.into(),
            provider,
            folder_id: folder_id.into(),
            is_active: false,
            is_pending_verification: true,
            access_denied: false,
            last_synced: None,
        }
    }
}
