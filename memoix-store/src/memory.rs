//! In-process store, for tests and previews.

use crate::error::{StoreError, StoreResult};
use crate::{LocalStore, SettingsStore};
use async_trait::async_trait;
use memoix_types::{Domain, RecordDoc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<Domain, Vec<RecordDoc>>,
    settings: HashMap<String, String>,
    next_id: i64,
}

/// A [`LocalStore`] and [`SettingsStore`] held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn find_all(&self, domain: Domain) -> StoreResult<Vec<RecordDoc>> {
        Ok(self.lock()?.records.get(&domain).cloned().unwrap_or_default())
    }

    async fn find_by_uuid(&self, domain: Domain, uuid: Uuid) -> StoreResult<Option<RecordDoc>> {
        Ok(self
            .lock()?
            .records
            .get(&domain)
            .and_then(|docs| docs.iter().find(|d| d.uuid == uuid).cloned()))
    }

    async fn upsert(&self, domain: Domain, docs: Vec<RecordDoc>) -> StoreResult<Vec<i64>> {
        let mut state = self.lock()?;
        let MemoryState {
            records, next_id, ..
        } = &mut *state;
        let table = records.entry(domain).or_default();

        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            if let Some(existing) = table.iter_mut().find(|d| d.uuid == doc.uuid) {
                let id = existing.id;
                *existing = doc.with_id(id);
                ids.push(id.unwrap_or_default());
            } else {
                *next_id += 1;
                let id = *next_id;
                table.push(doc.with_id(Some(id)));
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.settings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()?.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.lock()?.settings.remove(key);
        Ok(())
    }
}
