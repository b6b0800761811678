//! Last-write-wins merge of a remote bundle into the local store.
//!
//! Records are matched by `uuid` only. A remote record replaces its local
//! counterpart when it is strictly newer *and* its content differs; the
//! local id is always preserved. Each domain is written in a single
//! transactional upsert, so a failing domain leaves the others merged.

use crate::error::SyncResult;
use memoix_store::LocalStore;
use memoix_types::{Bundle, Domain, RecordDoc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Payload key excluded from content comparison.
const TIMESTAMP_KEY: &str = "updatedAt";

/// Per-record merge tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl MergeResult {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.unchanged
    }

    /// Whether the merge wrote anything.
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.updated > 0
    }

    /// User-facing summary, e.g. "Added 3, updated 1".
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.added > 0 {
            parts.push(format!("Added {}", self.added));
        }
        if self.updated > 0 {
            let verb = if parts.is_empty() { "Updated" } else { "updated" };
            parts.push(format!("{verb} {}", self.updated));
        }
        if parts.is_empty() {
            "Everything up to date".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl fmt::Display for MergeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl Add for MergeResult {
    type Output = MergeResult;

    fn add(self, rhs: Self) -> Self::Output {
        MergeResult {
            added: self.added + rhs.added,
            updated: self.updated + rhs.updated,
            unchanged: self.unchanged + rhs.unchanged,
        }
    }
}

impl AddAssign for MergeResult {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for MergeResult {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(MergeResult::default(), Add::add)
    }
}

/// Outcome of merging a whole bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Totals over every domain that merged.
    pub result: MergeResult,
    pub per_domain: BTreeMap<Domain, MergeResult>,
    /// Domains whose merge failed, with the error message.
    pub failed_domains: Vec<(Domain, String)>,
}

impl MergeReport {
    pub fn is_complete(&self) -> bool {
        self.failed_domains.is_empty()
    }
}

/// Hex SHA-256 over a record's payload in canonical form (object keys
/// sorted), ignoring the modification timestamp.
pub fn fingerprint(doc: &RecordDoc) -> String {
    let mut hasher = Sha256::new();
    match &doc.payload {
        Value::Object(map) => {
            hasher.update(b"{");
            let mut keys: Vec<&String> = map.keys().filter(|k| *k != TIMESTAMP_KEY).collect();
            keys.sort();
            for key in keys {
                hash_string(&mut hasher, key);
                hasher.update(b":");
                hash_value(&mut hasher, &map[key]);
                hasher.update(b",");
            }
            hasher.update(b"}");
        }
        other => hash_value(&mut hasher, other),
    }
    hex::encode(hasher.finalize())
}

fn hash_string(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
        Value::Number(n) => {
            hasher.update(b"#");
            hash_string(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update(b"s");
            hash_string(hasher, s);
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_value(hasher, item);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        Value::Object(map) => {
            hasher.update(b"{");
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                hash_string(hasher, key);
                hasher.update(b":");
                hash_value(hasher, &map[key]);
                hasher.update(b",");
            }
            hasher.update(b"}");
        }
    }
}

/// Merges remote snapshots into a [`LocalStore`].
#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<dyn LocalStore>,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Merges every domain of the bundle. Never fails as a whole: domains
    /// that fail are reported in [`MergeReport::failed_domains`].
    pub async fn merge_bundle(&self, bundle: &Bundle) -> MergeReport {
        let mut report = MergeReport::default();

        for domain in Domain::ALL {
            let merged = match bundle.documents(domain) {
                Ok(remote) => self.merge_domain(domain, remote).await,
                Err(e) => Err(e.into()),
            };
            match merged {
                Ok(result) => {
                    report.result += result;
                    report.per_domain.insert(domain, result);
                }
                Err(e) => {
                    error!(%domain, error = %e, "Domain merge failed");
                    report.failed_domains.push((domain, e.to_string()));
                }
            }
        }

        info!(
            added = report.result.added,
            updated = report.result.updated,
            unchanged = report.result.unchanged,
            failed = report.failed_domains.len(),
            "Merged bundle from {}",
            bundle.metadata.device_name
        );
        report
    }

    /// Merges one domain's remote documents with a single upsert.
    pub async fn merge_domain(
        &self,
        domain: Domain,
        remote: Vec<RecordDoc>,
    ) -> SyncResult<MergeResult> {
        let local = self.store.find_all(domain).await?;
        let mut known: HashMap<Uuid, RecordDoc> =
            local.into_iter().map(|doc| (doc.uuid, doc)).collect();

        let mut result = MergeResult::default();
        let mut writes = Vec::new();

        for incoming in remote {
            let uuid = incoming.uuid;
            let write = match known.get(&uuid) {
                None => {
                    result.added += 1;
                    Some(incoming.with_id(None))
                }
                Some(existing) if incoming.updated_at > existing.updated_at => {
                    if fingerprint(&incoming) == fingerprint(existing) {
                        result.unchanged += 1;
                        None
                    } else {
                        result.updated += 1;
                        Some(incoming.with_id(existing.id))
                    }
                }
                Some(_) => {
                    result.unchanged += 1;
                    None
                }
            };
            if let Some(doc) = write {
                known.insert(uuid, doc.clone());
                writes.push(doc);
            }
        }

        if !writes.is_empty() {
            self.store.upsert(domain, writes).await?;
        }
        debug!(%domain, ?result, "Merged domain");
        Ok(result)
    }
}
