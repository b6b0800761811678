//! Core type definitions for Memoix sync.
//!
//! This crate defines the data exchanged between devices and persisted
//! locally:
//! - Domain records (recipes, pizzas, cellar entries, ...) keyed by a stable UUID
//! - [`RecordDoc`], the storage-neutral envelope the store and merge engine use
//! - [`Bundle`] snapshots and the small [`StorageMeta`] freshness marker
//! - Configured remote [`Repository`] locations and the provider registry ids
//!
//! Nothing here performs I/O.

mod bundle;
mod domain;
mod ids;
mod record;
mod repository;

pub use bundle::{Bundle, BundleMetadata, StorageMeta, BUNDLE_FORMAT_VERSION};
pub use domain::Domain;
pub use ids::RepositoryId;
pub use record::{
    CellarEntry, CheeseEntry, DomainRecord, Ingredient, Pizza, Recipe, RecordDoc, Sandwich,
    SmokingRecipe,
};
pub use repository::{ProviderKind, Repository, SyncMode};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown sync mode: {0}")]
    UnknownSyncMode(String),
}
