//! Remote storage provider abstraction.
//!
//! A provider owns one remote folder at a time and exchanges two files with
//! it: the bundle and the meta marker. Everything above this trait is
//! provider-agnostic.

use crate::error::SyncResult;
use async_trait::async_trait;
use memoix_types::{Bundle, ProviderKind, StorageMeta};

/// A remote folder the engine can push bundles to and pull them from.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Registry key of this provider.
    fn kind(&self) -> ProviderKind;

    /// Human-readable provider name.
    fn name(&self) -> &'static str;

    /// Whether the provider holds a usable connection.
    fn is_connected(&self) -> bool;

    /// Identifier of the selected folder, as persisted in settings.
    fn connected_path(&self) -> Option<String>;

    /// Whether lifecycle-triggered syncs may use this provider.
    fn supports_automatic_sync(&self) -> bool;

    /// Whether `get_meta` is cheap enough to call before every pull.
    fn supports_fast_meta_check(&self) -> bool;

    /// Silently restores a previous session. Returns `Ok(false)` when there
    /// is nothing to restore; never prompts the user.
    async fn initialize(&self) -> SyncResult<bool>;

    /// Establishes a connection interactively where the provider needs one.
    async fn connect(&self) -> SyncResult<()>;

    /// Points the provider at a folder. Does not check access.
    async fn select_folder(&self, folder_id: &str) -> SyncResult<()>;

    /// Confirms the selected folder exists and can be read.
    async fn verify_access(&self) -> SyncResult<()>;

    async fn disconnect(&self) -> SyncResult<()>;

    /// Uploads a bundle, replacing any existing one.
    async fn push(&self, bundle: &Bundle) -> SyncResult<()>;

    /// Downloads the bundle, or `None` if the folder holds none yet.
    async fn pull(&self) -> SyncResult<Option<Bundle>>;

    /// Reads the meta marker, or `None` if absent.
    async fn get_meta(&self) -> SyncResult<Option<StorageMeta>>;

    async fn update_meta(&self, meta: &StorageMeta) -> SyncResult<()>;
}
