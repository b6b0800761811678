//! Remote storage providers.
//!
//! The engine talks to a remote folder only through [`StorageProvider`].
//! Two implementations ship with the crate: a plain directory (covering
//! desktop-synced cloud folders) and Google Drive over its REST API.

pub mod folder;
pub mod google_drive;
mod registry;
mod storage;

pub use folder::{FolderConfig, FolderProvider};
pub use google_drive::{GoogleDriveConfig, GoogleDriveProvider};
pub use registry::ProviderRegistry;
pub use storage::StorageProvider;
