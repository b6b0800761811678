//! Configured repositories and safe switching between them.
//!
//! The persisted repository list never holds more than one active entry.
//! Switching runs every readiness step against the target before anything
//! is persisted; a failing step puts the previous repository back.

use crate::cloud::{ProviderRegistry, StorageProvider};
use crate::error::{SyncError, SyncResult};
use crate::guard::FlagGuard;
use crate::settings::{ConnectionSnapshot, SyncSettings};
use chrono::{DateTime, Utc};
use memoix_types::{ProviderKind, Repository, RepositoryId};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Clears `is_active` on every entry after the first active one. Returns
/// true if anything changed.
fn enforce_single_active(repositories: &mut [Repository]) -> bool {
    let mut seen_active = false;
    let mut repaired = false;
    for repo in repositories.iter_mut() {
        if repo.is_active {
            if seen_active {
                repo.is_active = false;
                repaired = true;
            }
            seen_active = true;
        }
    }
    repaired
}

/// Everything a failed switch needs to put back.
struct SwitchSnapshot {
    previous_id: Option<RepositoryId>,
    active_kind: Option<ProviderKind>,
    connection: ConnectionSnapshot,
    /// Folder the target's provider pointed at before the switch.
    target_folder: Option<String>,
}

/// Manages the repository list and the active repository.
pub struct RepositorySwitcher {
    registry: Arc<ProviderRegistry>,
    settings: SyncSettings,
    switching: AtomicBool,
    /// Serializes read-modify-write cycles on the persisted list.
    list: Mutex<()>,
}

impl RepositorySwitcher {
    pub fn new(registry: Arc<ProviderRegistry>, settings: SyncSettings) -> Self {
        Self {
            registry,
            settings,
            switching: AtomicBool::new(false),
            list: Mutex::new(()),
        }
    }

    /// Loads the list, repairing it if more than one entry is active.
    async fn load(&self) -> SyncResult<Vec<Repository>> {
        let mut repositories = self.settings.repositories().await?;
        if enforce_single_active(&mut repositories) {
            warn!("Repository list had several active entries, keeping the first");
            self.settings.save_repositories(&repositories).await?;
        }
        Ok(repositories)
    }

    /// Applies `f` to one repository and persists the list.
    async fn update<F>(&self, id: RepositoryId, f: F) -> SyncResult<Repository>
    where
        F: FnOnce(&mut Repository),
    {
        let _list = self.list.lock().await;
        let mut repositories = self.load().await?;
        let repo = repositories
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SyncError::RepositoryNotFound(id.to_string()))?;
        f(repo);
        let updated = repo.clone();
        self.settings.save_repositories(&repositories).await?;
        Ok(updated)
    }

    pub async fn repositories(&self) -> SyncResult<Vec<Repository>> {
        let _list = self.list.lock().await;
        self.load().await
    }

    pub async fn active_repository(&self) -> SyncResult<Option<Repository>> {
        Ok(self.repositories().await?.into_iter().find(|r| r.is_active))
    }

    pub fn is_switching(&self) -> bool {
        self.switching.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Adds a repository. New repositories start pending verification.
    ///
    /// With `make_active`, the readiness steps run first and nothing is
    /// added if one fails. On success every other entry is deactivated and
    /// the repository's provider becomes the active one.
    pub async fn add_repository(
        &self,
        name: impl Into<String>,
        provider: ProviderKind,
        folder_id: impl Into<String>,
        make_active: bool,
    ) -> SyncResult<Repository> {
        let target = self.registry.resolve(provider)?;
        let mut repo = Repository::new(name, provider, folder_id);

        if make_active {
            let previous_folder = target.connected_path();
            if let Err(e) = prepare(target.as_ref(), &repo).await {
                warn!(repository = %repo.name, error = %e, "New repository not reachable, not added");
                restore_selection(target.as_ref(), previous_folder.as_deref()).await;
                return Err(e);
            }
            repo.is_pending_verification = false;
        }

        let _list = self.list.lock().await;
        let mut repositories = self.load().await?;
        if make_active {
            for other in repositories.iter_mut() {
                other.is_active = false;
            }
            repo.is_active = true;
        }
        repositories.push(repo.clone());
        self.settings.save_repositories(&repositories).await?;

        if make_active {
            self.settings
                .set_connection(provider, Some(&repo.folder_id))
                .await?;
            self.registry.set_active(provider)?;
        }

        info!(repository = %repo.name, provider = %provider, active = make_active, "Repository added");
        Ok(repo)
    }

    /// Removes a repository. Removing the active one disconnects.
    pub async fn remove_repository(&self, id: RepositoryId) -> SyncResult<Repository> {
        let _list = self.list.lock().await;
        let mut repositories = self.load().await?;
        let index = repositories
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| SyncError::RepositoryNotFound(id.to_string()))?;
        let removed = repositories.remove(index);
        self.settings.save_repositories(&repositories).await?;

        if removed.is_active {
            if self.registry.active_kind() == Some(removed.provider) {
                self.registry.clear_active();
            }
            self.settings.clear_connection().await?;
            info!(repository = %removed.name, "Active repository removed, disconnected");
        } else {
            info!(repository = %removed.name, "Repository removed");
        }
        Ok(removed)
    }

    pub async fn mark_as_verified(&self, id: RepositoryId) -> SyncResult<Repository> {
        self.update(id, |repo| {
            repo.is_pending_verification = false;
            repo.access_denied = false;
        })
        .await
    }

    pub async fn mark_as_access_denied(&self, id: RepositoryId) -> SyncResult<Repository> {
        self.update(id, |repo| repo.access_denied = true).await
    }

    pub async fn update_last_synced(
        &self,
        id: RepositoryId,
        at: DateTime<Utc>,
    ) -> SyncResult<Repository> {
        self.update(id, |repo| repo.last_synced = Some(at)).await
    }

    /// Runs the readiness checks against a repository without activating
    /// it, then records the result on the entry. The provider's previous
    /// folder selection is put back afterwards.
    pub async fn verify_repository(&self, id: RepositoryId) -> SyncResult<Repository> {
        let target = self
            .repositories()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| SyncError::RepositoryNotFound(id.to_string()))?;
        let provider = self.registry.resolve(target.provider)?;
        let previous_folder = provider.connected_path();

        let checked = prepare(provider.as_ref(), &target).await;

        if let Some(folder) = previous_folder.filter(|f| *f != target.folder_id) {
            if let Err(e) = provider.select_folder(&folder).await {
                warn!(error = %e, "Failed to restore provider folder selection");
            }
        }

        match checked {
            Ok(()) => {
                info!(repository = %target.name, "Repository verified");
                self.mark_as_verified(id).await
            }
            Err(SyncError::AccessDenied(reason)) => {
                warn!(repository = %target.name, %reason, "Repository not accessible");
                self.mark_as_access_denied(id).await?;
                Err(SyncError::AccessDenied(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Makes `id` the active repository.
    ///
    /// Rejected with [`SyncError::SwitchInProgress`] while another switch
    /// runs. Connects, selects and verifies the target folder first; on any
    /// failure the previous repository stays active and the error is
    /// returned.
    pub async fn set_active_repository(&self, id: RepositoryId) -> SyncResult<Repository> {
        let Some(_switching) = FlagGuard::acquire(&self.switching) else {
            return Err(SyncError::SwitchInProgress);
        };

        let repositories = self.repositories().await?;
        let target = repositories
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| SyncError::RepositoryNotFound(id.to_string()))?;
        let provider = self.registry.resolve(target.provider)?;

        let snapshot = SwitchSnapshot {
            previous_id: repositories.iter().find(|r| r.is_active).map(|r| r.id),
            active_kind: self.registry.active_kind(),
            connection: self.settings.connection().await?,
            target_folder: provider.connected_path(),
        };

        info!(repository = %target.name, provider = %target.provider, "Switching repository");

        let switched = match prepare(provider.as_ref(), &target).await {
            Ok(()) => self.activate(&target).await,
            Err(e) => Err(e),
        };

        match switched {
            Ok(repo) => {
                info!(repository = %repo.name, "Repository switched");
                Ok(repo)
            }
            Err(e) => {
                warn!(repository = %target.name, error = %e, "Switch failed, rolling back");
                let denied = matches!(e, SyncError::AccessDenied(_));
                self.rollback(provider.as_ref(), &target, &snapshot, denied)
                    .await;
                Err(e)
            }
        }
    }

    /// Persists the target as the only active repository.
    async fn activate(&self, target: &Repository) -> SyncResult<Repository> {
        let _list = self.list.lock().await;
        let mut repositories = self.load().await?;
        let mut activated = None;
        for repo in repositories.iter_mut() {
            repo.is_active = repo.id == target.id;
            if repo.is_active {
                repo.is_pending_verification = false;
                repo.access_denied = false;
                activated = Some(repo.clone());
            }
        }
        let activated = activated.ok_or_else(|| SyncError::RepositoryNotFound(target.id.to_string()))?;

        self.settings.save_repositories(&repositories).await?;
        self.settings
            .set_connection(target.provider, Some(&target.folder_id))
            .await?;
        self.registry.set_active(target.provider)?;
        Ok(activated)
    }

    /// Best effort: errors are logged, the original failure is what the
    /// caller sees.
    async fn rollback(
        &self,
        provider: &dyn StorageProvider,
        target: &Repository,
        snapshot: &SwitchSnapshot,
        access_denied: bool,
    ) {
        let restored: SyncResult<()> = async {
            let _list = self.list.lock().await;
            let mut repositories = self.load().await?;
            for repo in repositories.iter_mut() {
                repo.is_active = Some(repo.id) == snapshot.previous_id;
                if access_denied && repo.id == target.id {
                    repo.access_denied = true;
                }
            }
            self.settings.save_repositories(&repositories).await?;
            self.settings.restore_connection(&snapshot.connection).await?;
            Ok(())
        }
        .await;
        if let Err(e) = restored {
            error!(error = %e, "Failed to restore repository state");
        }

        self.registry.restore_active(snapshot.active_kind);

        restore_selection(provider, snapshot.target_folder.as_deref()).await;
        debug!(previous = ?snapshot.previous_id, "Rollback complete");
    }
}

/// Readiness steps run against the target before anything is persisted.
async fn prepare(provider: &dyn StorageProvider, target: &Repository) -> SyncResult<()> {
    provider.select_folder(&target.folder_id).await?;
    if !provider.is_connected() {
        provider.connect().await?;
    }
    provider.verify_access().await?;
    Ok(())
}

/// Puts back the folder a provider pointed at before a failed readiness
/// check. A provider that had none is disconnected so the failed target
/// does not stay selected.
async fn restore_selection(provider: &dyn StorageProvider, previous: Option<&str>) {
    let restored = match previous {
        Some(folder) => provider.select_folder(folder).await,
        None => provider.disconnect().await,
    };
    if let Err(e) = restored {
        warn!(error = %e, "Failed to restore provider folder selection");
    }
}
