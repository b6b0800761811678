//! The sync coordinator: decides when pushes and pulls happen.
//!
//! At most one push and at most one pull run at a time; a duplicate request
//! of the same kind is a silent no-op. Pushes and pulls additionally take a
//! shared transfer lock, so a merge never interleaves with a push.
//!
//! Local edits are batched by a debounce: every change restarts a timer and
//! only the last one in a burst leads to a push.

use crate::bundle::BundleCodec;
use crate::cloud::{ProviderRegistry, StorageProvider};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::guard::FlagGuard;
use crate::merge::MergeEngine;
use crate::retry::with_retry;
use crate::settings::SyncSettings;
use crate::status::{PullOutcome, PushOutcome, SkipReason, SyncNotice, SyncStatus};
use chrono::{DateTime, Utc};
use memoix_store::{LocalStore, SettingsStore};
use memoix_types::{ProviderKind, StorageMeta, SyncMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const NOTICE_CAPACITY: usize = 32;

/// Pending debounce timer.
#[derive(Default)]
struct Debounce {
    generation: u64,
    deadline: Option<Instant>,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    config: SyncConfig,
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn LocalStore>,
    settings: SyncSettings,
    merge: MergeEngine,
    init_started: AtomicBool,
    initialized: AtomicBool,
    mode: RwLock<SyncMode>,
    is_pushing: AtomicBool,
    is_pulling: AtomicBool,
    has_pending_changes: AtomicBool,
    transfer: tokio::sync::Mutex<()>,
    debounce: Mutex<Debounce>,
    status: watch::Sender<SyncStatus>,
    notices: broadcast::Sender<SyncNotice>,
}

/// Owns the sync flags and schedules pushes and pulls.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn LocalStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let merge = MergeEngine::new(Arc::clone(&store));

        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                store,
                settings: SyncSettings::new(settings),
                merge,
                init_started: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                mode: RwLock::new(SyncMode::default()),
                is_pushing: AtomicBool::new(false),
                is_pulling: AtomicBool::new(false),
                has_pending_changes: AtomicBool::new(false),
                transfer: tokio::sync::Mutex::new(()),
                debounce: Mutex::new(Debounce::default()),
                status,
                notices,
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    // ── Observers ──────────────────────────────────────────────────

    pub fn status(&self) -> SyncStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.inner.notices.subscribe()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.inner.has_pending_changes.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Whether an active provider holds a usable connection.
    pub fn is_connected(&self) -> bool {
        self.connected_provider().is_some()
    }

    /// The active provider, if it holds a usable connection.
    fn connected_provider(&self) -> Option<Arc<dyn StorageProvider>> {
        self.inner
            .registry
            .active()
            .filter(|p| p.is_connected())
    }

    pub fn sync_mode(&self) -> SyncMode {
        *self.inner.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn last_synced_at(&self) -> SyncResult<Option<DateTime<Utc>>> {
        self.inner.settings.last_synced_at().await
    }

    /// When the pending debounced push will fire, if one is scheduled.
    pub fn pending_push_deadline(&self) -> Option<Instant> {
        self.debounce().deadline
    }

    fn set_status(&self, status: SyncStatus) {
        self.inner.status.send_replace(status);
    }

    fn notify(&self, notice: SyncNotice) {
        // No subscribers is fine.
        let _ = self.inner.notices.send(notice);
    }

    fn automatic_and_connected(&self) -> bool {
        self.sync_mode().is_automatic() && self.is_connected()
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Restores the persisted provider connection. Runs once; any later
    /// call returns immediately, even while the first is still running.
    /// Never fails: problems are logged and leave the coordinator
    /// disconnected.
    pub async fn initialize(&self) {
        if self
            .inner
            .init_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Initialization already started, ignoring");
            return;
        }
        self.restore_session().await;
        self.inner.initialized.store(true, Ordering::Release);
    }

    async fn restore_session(&self) {
        let mode = self.inner.settings.sync_mode().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read sync mode");
            SyncMode::default()
        });
        *self.inner.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;

        if let Err(e) = self.reconnect_persisted_provider().await {
            warn!(error = %e, "Failed to restore sync connection");
        }

        info!(
            mode = %mode,
            connected = self.is_connected(),
            "Sync coordinator initialized"
        );

        if self.has_pending_changes() && self.automatic_and_connected() {
            info!("Pushing changes made before initialization");
            self.push(true).await;
        }
    }

    async fn reconnect_persisted_provider(&self) -> SyncResult<()> {
        let settings = &self.inner.settings;
        let Some(id) = settings.provider_id().await? else {
            debug!("No persisted sync provider");
            return Ok(());
        };

        let provider = match self.inner.registry.resolve_id(&id) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(provider = %id, error = %e, "Clearing unknown persisted provider");
                settings.clear_connection().await?;
                return Ok(());
            }
        };

        let path = settings.connected_path().await?;
        match restore_provider(provider.as_ref(), path.as_deref()).await {
            Ok(true) => {
                self.inner.registry.set_active(provider.kind())?;
                info!(provider = provider.name(), "Reconnected to sync provider");
            }
            Ok(false) => {
                warn!(provider = provider.name(), "Sync provider could not reconnect, clearing");
                settings.clear_connection().await?;
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Sync provider reconnect failed, clearing");
                settings.clear_connection().await?;
            }
        }
        Ok(())
    }

    /// Initializes, then pulls if the last sync is older than the launch
    /// cooldown. Returns the pull outcome if a pull ran.
    pub async fn on_app_launched(&self) -> Option<PullOutcome> {
        self.initialize().await;
        if !self.automatic_and_connected() {
            return None;
        }

        let last = self.inner.settings.last_synced_at().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read last sync time");
            None
        });
        if let Some(last) = last {
            let elapsed = Utc::now().signed_duration_since(last);
            if let Ok(elapsed) = elapsed.to_std() {
                if elapsed < self.inner.config.launch_cooldown {
                    debug!(elapsed_secs = elapsed.as_secs(), "Synced recently, skipping launch pull");
                    return None;
                }
            }
        }

        Some(self.pull(true).await)
    }

    /// Records a local edit. In automatic mode with a connected provider,
    /// (re)starts the debounce timer. Must be called from within a Tokio
    /// runtime for the timer to be scheduled.
    pub fn on_record_changed(&self) {
        self.inner.has_pending_changes.store(true, Ordering::Release);
        if self.automatic_and_connected() {
            self.schedule_debounced_push();
        }
    }

    /// Cancels the debounce and pushes pending changes right away.
    pub async fn on_app_backgrounded(&self) -> Option<PushOutcome> {
        self.cancel_debounce();
        if self.has_pending_changes() && self.automatic_and_connected() {
            Some(self.push(true).await)
        } else {
            None
        }
    }

    // ── Debounce ───────────────────────────────────────────────────

    fn debounce(&self) -> std::sync::MutexGuard<'_, Debounce> {
        self.inner
            .debounce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_debounced_push(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, debounced push not scheduled");
            return;
        };
        let delay = self.inner.config.debounce;
        let mut slot = self.debounce();
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.deadline = Some(Instant::now() + delay);

        let generation = slot.generation;
        let this = self.clone();
        slot.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Detach before pushing so a later cancel cannot abort the push.
            if !this.take_debounce(generation) {
                return;
            }
            this.push(true).await;
        }));
        debug!(delay_ms = delay.as_millis() as u64, "Debounced push scheduled");
    }

    fn take_debounce(&self, generation: u64) -> bool {
        let mut slot = self.debounce();
        if slot.generation != generation {
            return false;
        }
        slot.handle = None;
        slot.deadline = None;
        true
    }

    /// Cancels a scheduled debounced push. A push already in flight is not
    /// affected.
    pub fn cancel_debounce(&self) {
        let mut slot = self.debounce();
        if let Some(handle) = slot.handle.take() {
            handle.abort();
            debug!("Debounced push cancelled");
        }
        slot.deadline = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    // ── Push ───────────────────────────────────────────────────────

    /// Builds a bundle from the local store and uploads it with its meta.
    ///
    /// Silent pushes report failures only through the status; manual ones
    /// also emit a notice. Never returns an error.
    pub async fn push(&self, silent: bool) -> PushOutcome {
        let Some(provider) = self.connected_provider() else {
            warn!("Push requested with no sync provider connected");
            self.notify(SyncNotice::error("Connect a sync location first"));
            return PushOutcome::NotConnected;
        };
        let Some(_pushing) = FlagGuard::acquire(&self.inner.is_pushing) else {
            debug!("Push already in flight, ignoring");
            return PushOutcome::AlreadyRunning;
        };

        let _transfer = self.inner.transfer.lock().await;
        self.set_status(SyncStatus::Pushing);
        let had_pending = self.inner.has_pending_changes.swap(false, Ordering::AcqRel);

        match self.push_bundle(provider.as_ref()).await {
            Ok(meta) => {
                info!(
                    provider = provider.name(),
                    records = meta.total_records(),
                    "Push complete"
                );
                self.set_status(SyncStatus::Idle);
                if !silent {
                    self.notify(SyncNotice::success(format!(
                        "Synced {} items to {}",
                        meta.total_records(),
                        provider.name()
                    )));
                }
                if self.has_pending_changes() && self.automatic_and_connected() {
                    debug!("Changes arrived during push, rescheduling");
                    self.schedule_debounced_push();
                }
                PushOutcome::Pushed(meta)
            }
            Err(e) => {
                if had_pending {
                    self.inner.has_pending_changes.store(true, Ordering::Release);
                }
                error!(provider = provider.name(), error = %e, "Push failed");
                self.set_status(SyncStatus::Error);
                if !silent {
                    self.notify(SyncNotice::error(format!("Sync failed: {e}")));
                }
                PushOutcome::Failed(e.to_string())
            }
        }
    }

    async fn push_bundle(&self, provider: &dyn StorageProvider) -> SyncResult<StorageMeta> {
        let policy = &self.inner.config.retry;
        let bundle =
            BundleCodec::build(self.inner.store.as_ref(), &self.inner.config.device_name).await?;

        with_retry("push", policy, || provider.push(&bundle)).await?;
        let meta = BundleCodec::meta_for(&bundle);
        with_retry("update_meta", policy, || provider.update_meta(&meta)).await?;

        // Our own meta must never look newer than the last sync.
        self.inner.settings.set_last_synced_at(meta.timestamp).await?;
        Ok(meta)
    }

    // ── Pull ───────────────────────────────────────────────────────

    /// Downloads the remote bundle and merges it into the local store.
    pub async fn pull(&self, silent: bool) -> PullOutcome {
        let Some(provider) = self.connected_provider() else {
            debug!("Pull skipped, no sync provider connected");
            return PullOutcome::Skipped(SkipReason::NotConnected);
        };
        let Some(_pulling) = FlagGuard::acquire(&self.inner.is_pulling) else {
            debug!("Pull already in flight, ignoring");
            return PullOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        let _transfer = self.inner.transfer.lock().await;
        self.set_status(SyncStatus::Pulling);

        match self.pull_bundle(provider.as_ref()).await {
            Ok(outcome) => {
                self.set_status(SyncStatus::Idle);
                if !silent {
                    let message = match &outcome {
                        PullOutcome::Merged(result) => result.summary(),
                        PullOutcome::Skipped(SkipReason::RemoteEmpty) => {
                            "Nothing to sync yet".to_string()
                        }
                        _ => "Everything up to date".to_string(),
                    };
                    self.notify(SyncNotice::success(message));
                }
                outcome
            }
            Err(e) => {
                error!(provider = provider.name(), error = %e, "Pull failed");
                self.set_status(SyncStatus::Error);
                if !silent {
                    self.notify(SyncNotice::error(format!("Sync failed: {e}")));
                }
                PullOutcome::Failed(e.to_string())
            }
        }
    }

    async fn pull_bundle(&self, provider: &dyn StorageProvider) -> SyncResult<PullOutcome> {
        let policy = &self.inner.config.retry;

        if provider.supports_fast_meta_check() {
            let remote = with_retry("get_meta", policy, || provider.get_meta()).await?;
            let last = self.inner.settings.last_synced_at().await?;
            if let (Some(remote), Some(last)) = (&remote, last) {
                if remote.timestamp <= last {
                    debug!(
                        remote = %remote.timestamp,
                        last = %last,
                        "Remote not newer than last sync, skipping download"
                    );
                    return Ok(PullOutcome::Skipped(SkipReason::UpToDate));
                }
            }
        }

        let Some(bundle) = with_retry("pull", policy, || provider.pull()).await? else {
            debug!("Remote holds no bundle yet");
            return Ok(PullOutcome::Skipped(SkipReason::RemoteEmpty));
        };

        let report = self.inner.merge.merge_bundle(&bundle).await;
        if !report.is_complete() {
            return Err(SyncError::PartialMerge {
                failed: report
                    .failed_domains
                    .iter()
                    .map(|(domain, _)| domain.to_string())
                    .collect(),
            });
        }

        // Local time only. A remote clock running ahead must not push the
        // stamp past bundles other devices upload later.
        self.inner.settings.set_last_synced_at(Utc::now()).await?;
        Ok(PullOutcome::Merged(report.result))
    }

    // ── Settings ───────────────────────────────────────────────────

    /// Switches between manual and automatic sync. Automatic mode is
    /// rejected, with nothing changed, when the active provider cannot
    /// support it.
    pub async fn set_sync_mode(&self, mode: SyncMode) -> SyncResult<()> {
        if mode.is_automatic() {
            if let Some(provider) = self.inner.registry.active() {
                if !provider.supports_automatic_sync() {
                    return Err(SyncError::UnsupportedMode(format!(
                        "{} does not support automatic sync",
                        provider.name()
                    )));
                }
            }
        }

        self.inner.settings.set_sync_mode(mode).await?;
        *self.inner.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;
        if !mode.is_automatic() {
            self.cancel_debounce();
        }
        info!(mode = %mode, "Sync mode changed");
        Ok(())
    }

    /// Connects a provider at the user's request and makes it active.
    pub async fn connect(&self, kind: ProviderKind) -> SyncResult<()> {
        let provider = self.inner.registry.resolve(kind)?;
        provider.connect().await?;
        self.inner.registry.set_active(kind)?;
        self.inner
            .settings
            .set_connection(kind, provider.connected_path().as_deref())
            .await?;

        if self.sync_mode().is_automatic() && !provider.supports_automatic_sync() {
            warn!(provider = provider.name(), "Provider is manual-only, switching to manual sync");
            self.inner.settings.set_sync_mode(SyncMode::Manual).await?;
            *self.inner.mode.write().unwrap_or_else(PoisonError::into_inner) = SyncMode::Manual;
        }

        info!(provider = provider.name(), "Connected sync provider");
        Ok(())
    }

    /// Disconnects the active provider and forgets the persisted connection.
    pub async fn disconnect(&self) -> SyncResult<()> {
        self.cancel_debounce();
        if let Some(provider) = self.inner.registry.active() {
            provider.disconnect().await?;
            info!(provider = provider.name(), "Disconnected sync provider");
        }
        self.inner.registry.clear_active();
        self.inner.settings.clear_connection().await?;
        Ok(())
    }
}

/// Silent reconnect followed by re-selecting the persisted folder.
async fn restore_provider(provider: &dyn StorageProvider, path: Option<&str>) -> SyncResult<bool> {
    if !provider.initialize().await? {
        return Ok(false);
    }
    if let Some(path) = path {
        provider.select_folder(path).await?;
    }
    Ok(provider.is_connected())
}
