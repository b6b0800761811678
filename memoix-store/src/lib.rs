//! Local persistence for Memoix.
//!
//! Two collaborator interfaces the sync engine consumes:
//! - [`LocalStore`]: per-domain record documents keyed by UUID, with
//!   all-or-nothing batch upserts that keep the local row id stable
//! - [`SettingsStore`]: a flat key/value table for sync settings
//!
//! [`SqliteStore`] implements both on one SQLite file. [`MemoryStore`] keeps
//! everything in process and is what tests and previews use.

mod error;
mod memory;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use memoix_types::{Domain, DomainRecord, RecordDoc};
use uuid::Uuid;

/// Record storage, one logical table per domain.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Returns every record of a domain, ordered by local id.
    async fn find_all(&self, domain: Domain) -> StoreResult<Vec<RecordDoc>>;

    /// Looks a record up by its cross-device identity.
    async fn find_by_uuid(&self, domain: Domain, uuid: Uuid) -> StoreResult<Option<RecordDoc>>;

    /// Inserts or replaces records in one transaction.
    ///
    /// A record whose UUID already exists keeps its local id; new UUIDs get a
    /// fresh one. Returns the local ids in input order. Either every document
    /// is written or none is.
    async fn upsert(&self, domain: Domain, docs: Vec<RecordDoc>) -> StoreResult<Vec<i64>>;
}

/// Flat string key/value settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// Loads every record of one typed domain.
pub async fn load_all<R: DomainRecord>(store: &dyn LocalStore) -> StoreResult<Vec<R>> {
    store
        .find_all(R::DOMAIN)
        .await?
        .iter()
        .map(|doc| doc.to_record::<R>().map_err(StoreError::from))
        .collect()
}

/// Loads a single typed record by UUID.
pub async fn load_one<R: DomainRecord>(
    store: &dyn LocalStore,
    uuid: Uuid,
) -> StoreResult<Option<R>> {
    match store.find_by_uuid(R::DOMAIN, uuid).await? {
        Some(doc) => Ok(Some(doc.to_record()?)),
        None => Ok(None),
    }
}

/// Saves a typed record and writes the assigned local id back into it.
pub async fn save_record<R: DomainRecord>(store: &dyn LocalStore, record: &mut R) -> StoreResult<i64> {
    let doc = RecordDoc::from_record(record)?;
    let ids = store.upsert(R::DOMAIN, vec![doc]).await?;
    let id = ids
        .first()
        .copied()
        .ok_or_else(|| StoreError::InvalidData("upsert returned no id".to_string()))?;
    record.set_local_id(Some(id));
    Ok(id)
}
