//! Folder-backed storage provider.
//!
//! Works with any directory the OS can see: a plain local path, or a folder
//! kept in sync by a desktop cloud client (Google Drive, OneDrive, iCloud
//! Drive). Authentication is implicit through file system access.

use super::storage::StorageProvider;
use crate::bundle::{BUNDLE_FILE_NAME, BundleCodec, META_FILE_NAME};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use memoix_types::{Bundle, ProviderKind, StorageMeta};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tokio::fs;
use tracing::{debug, info};

/// Folder provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderConfig {
    /// Folder used by `connect` when none has been selected.
    pub default_folder: Option<PathBuf>,
    /// Create the folder on `connect` if it does not exist.
    #[serde(default)]
    pub create_missing: bool,
}

/// Stores the bundle and meta files in a directory.
pub struct FolderProvider {
    config: FolderConfig,
    folder: RwLock<Option<PathBuf>>,
}

impl FolderProvider {
    pub fn new(config: FolderConfig) -> Self {
        Self {
            config,
            folder: RwLock::new(None),
        }
    }

    fn folder(&self) -> Option<PathBuf> {
        self.folder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_folder(&self, folder: Option<PathBuf>) {
        *self.folder.write().unwrap_or_else(PoisonError::into_inner) = folder;
    }

    fn require_folder(&self) -> SyncResult<PathBuf> {
        self.folder().ok_or(SyncError::NotConnected)
    }

    async fn read_file(&self, name: &str) -> SyncResult<Option<Vec<u8>>> {
        let path = self.require_folder()?.join(name);
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read {} ({} bytes)", path.display(), bytes.len());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Writes through a temp file and a rename so readers never see a
    /// partially written file.
    async fn write_file(&self, name: &str, content: &[u8]) -> SyncResult<()> {
        let folder = self.require_folder()?;
        let target = folder.join(name);
        let staging = folder.join(format!(".{name}.tmp"));

        fs::write(&staging, content)
            .await
            .map_err(|e| io_error(&staging, e))?;
        fs::rename(&staging, &target)
            .await
            .map_err(|e| io_error(&target, e))?;

        debug!("Wrote {} ({} bytes)", target.display(), content.len());
        Ok(())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> SyncError {
    match e.kind() {
        ErrorKind::PermissionDenied => {
            SyncError::AccessDenied(format!("{}: {e}", path.display()))
        }
        _ => SyncError::Storage(format!("{}: {e}", path.display())),
    }
}

#[async_trait]
impl StorageProvider for FolderProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalFolder
    }

    fn name(&self) -> &'static str {
        "Local folder"
    }

    fn is_connected(&self) -> bool {
        self.folder().is_some()
    }

    fn connected_path(&self) -> Option<String> {
        self.folder().map(|p| p.to_string_lossy().into_owned())
    }

    fn supports_automatic_sync(&self) -> bool {
        true
    }

    fn supports_fast_meta_check(&self) -> bool {
        true
    }

    async fn initialize(&self) -> SyncResult<bool> {
        // No session to restore; the folder is re-selected from settings.
        Ok(true)
    }

    async fn connect(&self) -> SyncResult<()> {
        let folder = match self.folder() {
            Some(folder) => folder,
            None => self
                .config
                .default_folder
                .clone()
                .ok_or_else(|| SyncError::Storage("no folder selected".to_string()))?,
        };

        if !fs::try_exists(&folder).await.unwrap_or(false) {
            if !self.config.create_missing {
                return Err(SyncError::AccessDenied(format!(
                    "folder not found: {}",
                    folder.display()
                )));
            }
            fs::create_dir_all(&folder)
                .await
                .map_err(|e| io_error(&folder, e))?;
            info!("Created sync folder: {}", folder.display());
        }

        self.set_folder(Some(folder));
        Ok(())
    }

    async fn select_folder(&self, folder_id: &str) -> SyncResult<()> {
        self.set_folder(Some(PathBuf::from(folder_id)));
        Ok(())
    }

    async fn verify_access(&self) -> SyncResult<()> {
        let folder = self.require_folder()?;
        let metadata = fs::metadata(&folder).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                SyncError::AccessDenied(format!("folder not found: {}", folder.display()))
            }
            _ => io_error(&folder, e),
        })?;
        if !metadata.is_dir() {
            return Err(SyncError::AccessDenied(format!(
                "not a directory: {}",
                folder.display()
            )));
        }
        fs::read_dir(&folder)
            .await
            .map_err(|e| io_error(&folder, e))?;
        Ok(())
    }

    async fn disconnect(&self) -> SyncResult<()> {
        self.set_folder(None);
        Ok(())
    }

    async fn push(&self, bundle: &Bundle) -> SyncResult<()> {
        let bytes = BundleCodec::encode(bundle)?;
        self.write_file(BUNDLE_FILE_NAME, &bytes).await
    }

    async fn pull(&self) -> SyncResult<Option<Bundle>> {
        self.read_file(BUNDLE_FILE_NAME)
            .await?
            .map(|bytes| BundleCodec::decode(&bytes))
            .transpose()
    }

    async fn get_meta(&self) -> SyncResult<Option<StorageMeta>> {
        self.read_file(META_FILE_NAME)
            .await?
            .map(|bytes| BundleCodec::decode_meta(&bytes))
            .transpose()
    }

    async fn update_meta(&self, meta: &StorageMeta) -> SyncResult<()> {
        let bytes = BundleCodec::encode_meta(meta)?;
        self.write_file(META_FILE_NAME, &bytes).await
    }
}
