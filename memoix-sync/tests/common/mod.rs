#![allow(dead_code)]

use async_trait::async_trait;
use memoix_store::MemoryStore;
use memoix_sync::cloud::{ProviderRegistry, StorageProvider};
use memoix_sync::{RetryPolicy, SyncConfig, SyncCoordinator, SyncError, SyncResult};
use memoix_types::{Bundle, ProviderKind, StorageMeta};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted failure for a mock call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Auth,
    AccessDenied,
}

impl Failure {
    fn into_error(self) -> SyncError {
        match self {
            Failure::Network => SyncError::Network("connection reset".to_string()),
            Failure::Auth => SyncError::Auth("token revoked".to_string()),
            Failure::AccessDenied => SyncError::AccessDenied("folder gone".to_string()),
        }
    }
}

#[derive(Default)]
struct MockState {
    connected: bool,
    folder: Option<String>,
    bundle: Option<Bundle>,
    meta: Option<StorageMeta>,
    initialize_result: Option<bool>,
    push_failures: VecDeque<Failure>,
    pull_failures: VecDeque<Failure>,
    verify_failure: Option<Failure>,
}

/// In-memory provider with call counters, scripted failures and delays.
pub struct MockProvider {
    kind: ProviderKind,
    automatic: bool,
    fast_meta: bool,
    transfer_delay: Duration,
    verify_delay: Duration,
    state: Mutex<MockState>,
    pub initialize_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub push_calls: AtomicUsize,
    pub pushes_completed: AtomicUsize,
    pub pull_calls: AtomicUsize,
    pub meta_calls: AtomicUsize,
    pub select_calls: AtomicUsize,
    active_transfers: AtomicUsize,
    pub max_concurrent_transfers: AtomicUsize,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            automatic: true,
            fast_meta: true,
            transfer_delay: Duration::ZERO,
            verify_delay: Duration::ZERO,
            state: Mutex::new(MockState {
                initialize_result: Some(true),
                ..MockState::default()
            }),
            initialize_calls: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            push_calls: AtomicUsize::new(0),
            pushes_completed: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
            meta_calls: AtomicUsize::new(0),
            select_calls: AtomicUsize::new(0),
            active_transfers: AtomicUsize::new(0),
            max_concurrent_transfers: AtomicUsize::new(0),
        }
    }

    pub fn manual_only(mut self) -> Self {
        self.automatic = false;
        self
    }

    pub fn without_fast_meta(mut self) -> Self {
        self.fast_meta = false;
        self
    }

    pub fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = delay;
        self
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    /// Starts out connected to the given folder.
    pub fn connected_to(self, folder: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.connected = true;
            state.folder = Some(folder.to_string());
        }
        self
    }

    pub fn set_initialize_result(&self, result: Option<bool>) {
        self.state.lock().unwrap().initialize_result = result;
    }

    pub fn fail_pushes(&self, failures: &[Failure]) {
        self.state.lock().unwrap().push_failures = failures.iter().copied().collect();
    }

    pub fn fail_pulls(&self, failures: &[Failure]) {
        self.state.lock().unwrap().pull_failures = failures.iter().copied().collect();
    }

    pub fn fail_verify(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().verify_failure = failure;
    }

    pub fn set_remote(&self, bundle: Option<Bundle>, meta: Option<StorageMeta>) {
        let mut state = self.state.lock().unwrap();
        state.bundle = bundle;
        state.meta = meta;
    }

    pub fn remote_bundle(&self) -> Option<Bundle> {
        self.state.lock().unwrap().bundle.clone()
    }

    pub fn remote_meta(&self) -> Option<StorageMeta> {
        self.state.lock().unwrap().meta.clone()
    }

    pub fn folder(&self) -> Option<String> {
        self.state.lock().unwrap().folder.clone()
    }

    pub fn pushes(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    async fn transfer(&self) {
        let active = self.active_transfers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_transfers.fetch_max(active, Ordering::SeqCst);
        if !self.transfer_delay.is_zero() {
            tokio::time::sleep(self.transfer_delay).await;
        }
        self.active_transfers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "Mock"
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.connected && state.folder.is_some()
    }

    fn connected_path(&self) -> Option<String> {
        self.state.lock().unwrap().folder.clone()
    }

    fn supports_automatic_sync(&self) -> bool {
        self.automatic
    }

    fn supports_fast_meta_check(&self) -> bool {
        self.fast_meta
    }

    async fn initialize(&self) -> SyncResult<bool> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        match state.initialize_result {
            Some(ok) => {
                state.connected = ok;
                Ok(ok)
            }
            None => Err(SyncError::Auth("refresh token expired".to_string())),
        }
    }

    async fn connect(&self) -> SyncResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.connected = true;
        if state.folder.is_none() {
            state.folder = Some("default".to_string());
        }
        Ok(())
    }

    async fn select_folder(&self, folder_id: &str) -> SyncResult<()> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().folder = Some(folder_id.to_string());
        Ok(())
    }

    async fn verify_access(&self) -> SyncResult<()> {
        if !self.verify_delay.is_zero() {
            tokio::time::sleep(self.verify_delay).await;
        }
        let failure = self.state.lock().unwrap().verify_failure;
        match failure {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.folder = None;
        Ok(())
    }

    async fn push(&self, bundle: &Bundle) -> SyncResult<()> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.transfer().await;
        let failure = self.state.lock().unwrap().push_failures.pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }
        self.state.lock().unwrap().bundle = Some(bundle.clone());
        self.pushes_completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pull(&self) -> SyncResult<Option<Bundle>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.transfer().await;
        let failure = self.state.lock().unwrap().pull_failures.pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }
        Ok(self.state.lock().unwrap().bundle.clone())
    }

    async fn get_meta(&self) -> SyncResult<Option<StorageMeta>> {
        self.meta_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().meta.clone())
    }

    async fn update_meta(&self, meta: &StorageMeta) -> SyncResult<()> {
        self.state.lock().unwrap().meta = Some(meta.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MockProvider>,
    pub registry: Arc<ProviderRegistry>,
    pub coordinator: SyncCoordinator,
}

/// Short backoff so paused-clock tests stay readable.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Some(Duration::from_secs(60)),
        },
        ..SyncConfig::for_device("Test Device")
    }
}

pub fn harness(provider: MockProvider) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(provider);
    let registry = Arc::new(ProviderRegistry::new().with_provider(provider.clone()));
    let coordinator = SyncCoordinator::new(
        test_config(),
        registry.clone(),
        store.clone(),
        store.clone(),
    );
    Harness {
        store,
        provider,
        registry,
        coordinator,
    }
}

impl Harness {
    /// Persists the mock as the connected provider and the given mode, then
    /// initializes the coordinator.
    pub async fn connected(self, mode: memoix_types::SyncMode) -> Self {
        let settings = self.coordinator.settings();
        settings
            .set_connection(self.provider.kind(), Some("recipes-folder"))
            .await
            .unwrap();
        settings.set_sync_mode(mode).await.unwrap();
        self.coordinator.initialize().await;
        assert!(self.coordinator.is_connected());
        self
    }
}
