//! Sync engine for Memoix.
//!
//! Keeps a device's recipe collections consistent with a user-chosen
//! remote folder, with no server in between. Every device pushes a full
//! snapshot (a [`Bundle`](memoix_types::Bundle)) and pulls the others'
//! snapshots, merging them record by record with last-write-wins.
//!
//! # Components
//!
//! - **Coordinator**: decides when pushes and pulls happen (debounced
//!   edits, launch and background hooks, manual syncs)
//! - **Merge**: last-write-wins by record UUID, content-aware
//! - **Retry**: bounded exponential backoff with per-attempt timeouts
//! - **Repository**: the list of configured remote folders and safe
//!   switching between them
//! - **Cloud**: the [`StorageProvider`] trait and its implementations
//!
//! # Example
//!
//! ```no_run
//! use memoix_store::MemoryStore;
//! use memoix_sync::cloud::{FolderConfig, FolderProvider, ProviderRegistry};
//! use memoix_sync::{SyncConfig, SyncCoordinator};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let store = Arc::new(MemoryStore::new());
//! let registry = Arc::new(
//!     ProviderRegistry::new()
//!         .with_provider(Arc::new(FolderProvider::new(FolderConfig::default()))),
//! );
//! let coordinator = SyncCoordinator::new(
//!     SyncConfig::for_device("Kitchen iPad"),
//!     registry,
//!     store.clone(),
//!     store,
//! );
//! coordinator.on_app_launched().await;
//! # }
//! ```

mod bundle;
pub mod cloud;
mod config;
mod coordinator;
mod error;
mod guard;
mod merge;
mod repository;
mod retry;
mod settings;
mod status;

pub use bundle::{BUNDLE_FILE_NAME, BundleCodec, META_FILE_NAME};
pub use cloud::{ProviderRegistry, StorageProvider};
pub use config::SyncConfig;
pub use coordinator::SyncCoordinator;
pub use error::{SyncError, SyncResult};
pub use merge::{MergeEngine, MergeReport, MergeResult, fingerprint};
pub use repository::RepositorySwitcher;
pub use retry::{RetryPolicy, with_retry};
pub use settings::{ConnectionSnapshot, SyncSettings, keys as settings_keys};
pub use status::{NoticeLevel, PullOutcome, PushOutcome, SkipReason, SyncNotice, SyncStatus};
