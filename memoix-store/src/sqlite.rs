//! SQLite-backed record and settings store.
//!
//! Records of every domain share one table keyed by `(domain, uuid)`; the
//! autoincrement `id` column is the local id and is never rewritten by an
//! upsert. Settings live in a separate key/value table in the same file.

use crate::error::{StoreError, StoreResult};
use crate::{LocalStore, SettingsStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use memoix_types::{Domain, RecordDoc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Persistent store backed by a single SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("Created store directory: {}", parent.display());
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                uuid TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                UNIQUE(domain, uuid)
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

type RecordRow = (i64, String, String, String);

fn row_to_doc((id, uuid, updated_at, payload): RecordRow) -> StoreResult<RecordDoc> {
    let uuid = Uuid::parse_str(&uuid)
        .map_err(|e| StoreError::InvalidData(format!("invalid uuid in records: {e}")))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| StoreError::InvalidData(format!("invalid updated_at in records: {e}")))?
        .with_timezone(&Utc);
    Ok(RecordDoc {
        id: Some(id),
        uuid,
        updated_at,
        payload: serde_json::from_str(&payload)?,
    })
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn find_all(&self, domain: Domain) -> StoreResult<Vec<RecordDoc>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uuid, updated_at, payload FROM records WHERE domain = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![domain.as_str()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<RecordRow>, _>>()?;
            rows.into_iter().map(row_to_doc).collect()
        })
        .await
    }

    async fn find_by_uuid(&self, domain: Domain, uuid: Uuid) -> StoreResult<Option<RecordDoc>> {
        self.with_conn(move |conn| {
            let row: Option<RecordRow> = conn
                .query_row(
                    "SELECT id, uuid, updated_at, payload FROM records WHERE domain = ?1 AND uuid = ?2",
                    params![domain.as_str(), uuid.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            row.map(row_to_doc).transpose()
        })
        .await
    }

    async fn upsert(&self, domain: Domain, docs: Vec<RecordDoc>) -> StoreResult<Vec<i64>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut ids = Vec::with_capacity(docs.len());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO records (domain, uuid, updated_at, payload) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(domain, uuid) DO UPDATE SET
                         updated_at = excluded.updated_at,
                         payload = excluded.payload
                     RETURNING id",
                )?;
                for doc in &docs {
                    let payload = serde_json::to_string(&doc.payload)?;
                    let id: i64 = stmt.query_row(
                        params![
                            domain.as_str(),
                            doc.uuid.to_string(),
                            format_timestamp(&doc.updated_at),
                            payload,
                        ],
                        |row| row.get(0),
                    )?;
                    ids.push(id);
                }
            }
            tx.commit()?;
            debug!("Upserted {} {} records", ids.len(), domain);
            Ok(ids)
        })
        .await
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }
}
