//! Bundle snapshots and the remote freshness marker.
//!
//! A [`Bundle`] is a total snapshot of every domain, never a delta. It is
//! exchanged wholesale with the remote folder. [`StorageMeta`] is the small
//! companion file written after every successful push so other devices can
//! decide whether downloading the bundle is worth it.

use crate::{
    CellarEntry, CheeseEntry, Domain, DomainRecord, Pizza, Recipe, RecordDoc, Result, Sandwich,
    SmokingRecipe,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current bundle wire format version.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    BUNDLE_FORMAT_VERSION
}

/// Who produced a bundle and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    pub device_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
}

/// Full snapshot of all local domain records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub metadata: BundleMetadata,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
    #[serde(default)]
    pub pizzas: Vec<Pizza>,
    #[serde(default)]
    pub sandwiches: Vec<Sandwich>,
    #[serde(default)]
    pub smoking: Vec<SmokingRecipe>,
    #[serde(default)]
    pub cheese: Vec<CheeseEntry>,
    #[serde(default)]
    pub cellar: Vec<CellarEntry>,
}

impl Bundle {
    /// Creates an empty bundle stamped with the current time.
    pub fn empty(device_name: impl Into<String>) -> Self {
        Self::empty_at(device_name, Utc::now())
    }

    /// Creates an empty bundle stamped with the given time.
    pub fn empty_at(device_name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            metadata: BundleMetadata {
                device_name: device_name.into(),
                created_at,
                format_version: BUNDLE_FORMAT_VERSION,
            },
            recipes: Vec::new(),
            pizzas: Vec::new(),
            sandwiches: Vec::new(),
            smoking: Vec::new(),
            cheese: Vec::new(),
            cellar: Vec::new(),
        }
    }

    /// Appends a typed record to its domain's list.
    pub fn push_record<R: DomainRecord>(&mut self, record: R) {
        R::in_bundle_mut(self).push(record);
    }

    /// Returns the typed records of one domain.
    pub fn records<R: DomainRecord>(&self) -> &[R] {
        R::in_bundle(self)
    }

    /// Number of records in one domain.
    pub fn len(&self, domain: Domain) -> usize {
        match domain {
            Domain::Recipes => self.recipes.len(),
            Domain::Pizzas => self.pizzas.len(),
            Domain::Sandwiches => self.sandwiches.len(),
            Domain::Smoking => self.smoking.len(),
            Domain::Cheese => self.cheese.len(),
            Domain::Cellar => self.cellar.len(),
        }
    }

    /// Total number of records across all domains.
    pub fn total_records(&self) -> usize {
        Domain::ALL.iter().map(|d| self.len(*d)).sum()
    }

    /// Returns true if no domain holds a record.
    pub fn is_empty(&self) -> bool {
        self.total_records() == 0
    }

    /// Per-domain record counts keyed by the domain's string id.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        Domain::ALL
            .iter()
            .map(|d| (d.as_str().to_string(), self.len(*d)))
            .collect()
    }

    /// Converts one domain's records into store documents.
    pub fn documents(&self, domain: Domain) -> Result<Vec<RecordDoc>> {
        match domain {
            Domain::Recipes => to_documents(&self.recipes),
            Domain::Pizzas => to_documents(&self.pizzas),
            Domain::Sandwiches => to_documents(&self.sandwiches),
            Domain::Smoking => to_documents(&self.smoking),
            Domain::Cheese => to_documents(&self.cheese),
            Domain::Cellar => to_documents(&self.cellar),
        }
    }

    /// Replaces one domain's records with the decoded documents.
    pub fn set_documents(&mut self, domain: Domain, docs: &[RecordDoc]) -> Result<()> {
        match domain {
            Domain::Recipes => self.recipes = from_documents(docs)?,
            Domain::Pizzas => self.pizzas = from_documents(docs)?,
            Domain::Sandwiches => self.sandwiches = from_documents(docs)?,
            Domain::Smoking => self.smoking = from_documents(docs)?,
            Domain::Cheese => self.cheese = from_documents(docs)?,
            Domain::Cellar => self.cellar = from_documents(docs)?,
        }
        Ok(())
    }
}

fn to_documents<R: DomainRecord>(records: &[R]) -> Result<Vec<RecordDoc>> {
    records
        .iter()
        .map(|r| RecordDoc::from_record(r).map(|doc| doc.with_id(None)))
        .collect()
}

fn from_documents<R: DomainRecord>(docs: &[RecordDoc]) -> Result<Vec<R>> {
    docs.iter()
        .map(|doc| doc.clone().with_id(None).to_record::<R>())
        .collect()
}

/// Remote-side freshness marker, written after every successful push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMeta {
    pub device_name: String,
    #[serde(default)]
    pub counts: BTreeMap<String, usize>,
    pub timestamp: DateTime<Utc>,
}

impl StorageMeta {
    /// Describes a bundle. The timestamp is never earlier than the bundle's
    /// creation time, even if the wall clock stepped backwards.
    pub fn for_bundle(bundle: &Bundle) -> Self {
        Self::for_bundle_at(bundle, Utc::now())
    }

    /// Describes a bundle using the given clock reading.
    pub fn for_bundle_at(bundle: &Bundle, now: DateTime<Utc>) -> Self {
        Self {
            device_name: bundle.metadata.device_name.clone(),
            counts: bundle.counts(),
            timestamp: now.max(bundle.metadata.created_at),
        }
    }

    /// Total number of records the described bundle holds.
    pub fn total_records(&self) -> usize {
        self.counts.values().sum()
    }
}
