//! Closed registry of storage providers with one active slot.

use super::storage::StorageProvider;
use crate::error::{SyncError, SyncResult};
use memoix_types::ProviderKind;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Providers keyed by [`ProviderKind`], plus the one currently in use.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderKind, Arc<dyn StorageProvider>>,
    active: RwLock<Option<ProviderKind>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own kind, replacing any previous one.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn StorageProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn StorageProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }

    pub fn resolve(&self, kind: ProviderKind) -> SyncResult<Arc<dyn StorageProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| SyncError::UnknownProvider(kind.to_string()))
    }

    /// Resolves a persisted provider id. Ids outside the closed set and
    /// kinds with no registered provider are both errors.
    pub fn resolve_id(&self, id: &str) -> SyncResult<Arc<dyn StorageProvider>> {
        let kind: ProviderKind = id
            .parse()
            .map_err(|_| SyncError::UnknownProvider(id.to_string()))?;
        self.resolve(kind)
    }

    pub fn active_kind(&self) -> Option<ProviderKind> {
        *self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active provider, if one is set.
    pub fn active(&self) -> Option<Arc<dyn StorageProvider>> {
        self.active_kind()
            .and_then(|kind| self.providers.get(&kind).cloned())
    }

    pub fn set_active(&self, kind: ProviderKind) -> SyncResult<()> {
        if !self.providers.contains_key(&kind) {
            return Err(SyncError::UnknownProvider(kind.to_string()));
        }
        debug!(provider = %kind, "Active provider set");
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(kind);
        Ok(())
    }

    pub fn clear_active(&self) {
        debug!("Active provider cleared");
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Puts back a previously captured active slot.
    pub fn restore_active(&self, kind: Option<ProviderKind>) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = kind;
    }
}
