//! Typed access to the sync keys of a [`SettingsStore`].

use crate::error::SyncResult;
use chrono::{DateTime, SecondsFormat, Utc};
use memoix_store::SettingsStore;
use memoix_types::{ProviderKind, Repository, SyncMode};
use std::sync::Arc;
use tracing::warn;

/// Setting keys owned by the sync engine.
pub mod keys {
    pub const LAST_SYNCED_AT: &str = "sync.last_synced_at";
    pub const SYNC_MODE: &str = "sync.mode";
    pub const PROVIDER_ID: &str = "sync.provider_id";
    pub const CONNECTED_PATH: &str = "sync.connected_path";
    pub const REPOSITORIES: &str = "sync.repositories";
}

use keys::{CONNECTED_PATH, LAST_SYNCED_AT, PROVIDER_ID, REPOSITORIES, SYNC_MODE};

/// The persisted provider connection, captured so it can be restored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub provider_id: Option<String>,
    pub path: Option<String>,
}

/// Sync settings on top of a flat key/value store.
///
/// Unreadable values (a corrupt timestamp, an unknown mode) are logged and
/// treated as absent rather than failing the caller.
#[derive(Clone)]
pub struct SyncSettings {
    store: Arc<dyn SettingsStore>,
}

impl SyncSettings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub async fn last_synced_at(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get(LAST_SYNCED_AT).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring unparsable last sync timestamp");
                Ok(None)
            }
        }
    }

    pub async fn set_last_synced_at(&self, ts: DateTime<Utc>) -> SyncResult<()> {
        let value = ts.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        self.store.set(LAST_SYNCED_AT, &value).await?;
        Ok(())
    }

    pub async fn sync_mode(&self) -> SyncResult<SyncMode> {
        let Some(raw) = self.store.get(SYNC_MODE).await? else {
            return Ok(SyncMode::default());
        };
        Ok(raw.parse().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to manual sync mode");
            SyncMode::default()
        }))
    }

    pub async fn set_sync_mode(&self, mode: SyncMode) -> SyncResult<()> {
        self.store.set(SYNC_MODE, mode.as_str()).await?;
        Ok(())
    }

    /// Raw persisted provider id. Parsing is left to the registry so unknown
    /// ids can be reported and cleared.
    pub async fn provider_id(&self) -> SyncResult<Option<String>> {
        Ok(self.store.get(PROVIDER_ID).await?)
    }

    pub async fn connected_path(&self) -> SyncResult<Option<String>> {
        Ok(self.store.get(CONNECTED_PATH).await?)
    }

    pub async fn connection(&self) -> SyncResult<ConnectionSnapshot> {
        Ok(ConnectionSnapshot {
            provider_id: self.provider_id().await?,
            path: self.connected_path().await?,
        })
    }

    pub async fn set_connection(&self, kind: ProviderKind, path: Option<&str>) -> SyncResult<()> {
        self.store.set(PROVIDER_ID, kind.as_str()).await?;
        match path {
            Some(path) => self.store.set(CONNECTED_PATH, path).await?,
            None => self.store.remove(CONNECTED_PATH).await?,
        }
        Ok(())
    }

    pub async fn restore_connection(&self, snapshot: &ConnectionSnapshot) -> SyncResult<()> {
        match &snapshot.provider_id {
            Some(id) => self.store.set(PROVIDER_ID, id).await?,
            None => self.store.remove(PROVIDER_ID).await?,
        }
        match &snapshot.path {
            Some(path) => self.store.set(CONNECTED_PATH, path).await?,
            None => self.store.remove(CONNECTED_PATH).await?,
        }
        Ok(())
    }

    pub async fn clear_connection(&self) -> SyncResult<()> {
        self.restore_connection(&ConnectionSnapshot::default()).await
    }

    /// The persisted repository list, exactly as stored.
    pub async fn repositories(&self) -> SyncResult<Vec<Repository>> {
        match self.store.get(REPOSITORIES).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn save_repositories(&self, repositories: &[Repository]) -> SyncResult<()> {
        let raw = serde_json::to_string(repositories)?;
        self.store.set(REPOSITORIES, &raw).await?;
        Ok(())
    }
}
