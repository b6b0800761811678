//! Domain records and the storage-neutral [`RecordDoc`] envelope.
//!
//! Every record carries two identities:
//! - `uuid`: stable across devices, the only key used when merging
//! - `id`: the local store's row id, never serialized and never compared
//!   across devices
//!
//! The local id is `#[serde(skip)]` on every record type, so it cannot leak
//! into a bundle.

use crate::{Bundle, Domain, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Behaviour shared by every concrete record type.
pub trait DomainRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The domain this record type belongs to.
    const DOMAIN: Domain;

    /// Cross-device identity.
    fn uuid(&self) -> Uuid;

    /// Local storage-engine id, if the record has been stored.
    fn local_id(&self) -> Option<i64>;

    /// Sets the local storage-engine id.
    fn set_local_id(&mut self, id: Option<i64>);

    /// Last modification time.
    fn updated_at(&self) -> DateTime<Utc>;

    /// Bumps `updated_at` to now. Call on every local edit.
    fn touch(&mut self);

    /// This domain's records inside a bundle.
    fn in_bundle(bundle: &Bundle) -> &[Self];

    /// Mutable access to this domain's records inside a bundle.
    fn in_bundle_mut(bundle: &mut Bundle) -> &mut Vec<Self>;
}

/// A record as the local store and merge engine see it: identity columns
/// plus the record's JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDoc {
    /// Local row id. `None` until the store assigns one.
    pub id: Option<i64>,
    /// Cross-device identity.
    pub uuid: Uuid,
    /// Last modification time, mirrored from the payload.
    pub updated_at: DateTime<Utc>,
    /// Full JSON representation of the record (without the local id).
    pub payload: serde_json::Value,
}

impl RecordDoc {
    /// Wraps a typed record.
    pub fn from_record<R: DomainRecord>(record: &R) -> Result<Self> {
        Ok(Self {
            id: record.local_id(),
            uuid: record.uuid(),
            updated_at: record.updated_at(),
            payload: serde_json::to_value(record)?,
        })
    }

    /// Decodes the payload back into a typed record carrying this doc's local id.
    pub fn to_record<R: DomainRecord>(&self) -> Result<R> {
        let mut record: R = serde_json::from_value(self.payload.clone())?;
        record.set_local_id(self.id);
        Ok(record)
    }

    /// Returns a copy carrying a different local id.
    #[must_use]
    pub fn with_id(mut self, id: Option<i64>) -> Self {
        self.id = id;
        self
    }
}

macro_rules! domain_record {
    ($ty:ty, $domain:expr, $field:ident) => {
        impl DomainRecord for $ty {
            const DOMAIN: Domain = $domain;

            fn uuid(&self) -> Uuid {
                self.uuid
            }

            fn local_id(&self) -> Option<i64> {
                self.id
            }

            fn set_local_id(&mut self, id: Option<i64>) {
                self.id = id;
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }

            fn touch(&mut self) {
                self.updated_at = Utc::now();
            }

            fn in_bundle(bundle: &Bundle) -> &[Self] {
                &bundle.$field
            }

            fn in_bundle_mut(bundle: &mut Bundle) -> &mut Vec<Self> {
                &mut bundle.$field
            }
        }
    };
}

/// One line of a recipe's ingredient list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub preparation: Option<String>,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub section: Option<String>,
}

impl Ingredient {
    /// Creates an ingredient with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A standard recipe (mains, soups, desserts, sauces, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(skip)]
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    /// Course slug, e.g. `mains`, `soups`, `desserts`.
    pub course: String,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub serves: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub directions: Vec<String>,
    #[serde(default)]
    pub pairs_with: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub updated_at: DateTime<Utc>,
}

impl Recipe {
    /// Creates an empty recipe in the given course.
    pub fn new(name: impl Into<String>, course: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            course: course.into(),
            cuisine: None,
            serves: None,
            time: None,
            ingredients: Vec::new(),
            directions: Vec::new(),
            pairs_with: Vec::new(),
            notes: None,
            tags: Vec::new(),
            is_favorite: false,
            updated_at: Utc::now(),
        }
    }
}

domain_record!(Recipe, Domain::Recipes, recipes);

/// A pizza: base sauce, cheeses and toppings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pizza {
    #[serde(skip)]
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub cheeses: Vec<String>,
    #[serde(default)]
    pub proteins: Vec<String>,
    #[serde(default)]
    pub vegetables: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub updated_at: DateTime<Utc>,
}

impl Pizza {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            base: None,
            cheeses: Vec::new(),
            proteins: Vec::new(),
            vegetables: Vec::new(),
            notes: None,
            is_favorite: false,
            updated_at: Utc::now(),
        }
    }
}

domain_record!(Pizza, Domain::Pizzas, pizzas);

/// A sandwich build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sandwich {
    #[serde(skip)]
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub bread: Option<String>,
    #[serde(default)]
    pub proteins: Vec<String>,
    #[serde(default)]
    pub vegetables: Vec<String>,
    #[serde(default)]
    pub cheeses: Vec<String>,
    #[serde(default)]
    pub condiments: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub updated_at: DateTime<Utc>,
}

impl Sandwich {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            bread: None,
            proteins: Vec::new(),
            vegetables: Vec::new(),
            cheeses: Vec::new(),
            condiments: Vec::new(),
            notes: None,
            is_favorite: false,
            updated_at: Utc::now(),
        }
    }
}

domain_record!(Sandwich, Domain::Sandwiches, sandwiches);

/// A smoking recipe: wood, temperature and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokingRecipe {
    #[serde(skip)]
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub wood: Option<String>,
    #[serde(default)]
    pub temperature: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub seasonings: Vec<Ingredient>,
    #[serde(default)]
    pub directions: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub updated_at: DateTime<Utc>,
}

impl SmokingRecipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            wood: None,
            temperature: None,
            time: None,
            seasonings: Vec::new(),
            directions: Vec::new(),
            notes: None,
            is_favorite: false,
            updated_at: Utc::now(),
        }
    }
}

domain_record!(SmokingRecipe, Domain::Smoking, smoking);

/// A cheese journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheeseEntry {
    #[serde(skip)]
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub milk: Option<String>,
    #[serde(default)]
    pub texture: Option<String>,
    #[serde(default)]
    pub flavour: Option<String>,
    #[serde(default)]
    pub price_range: Option<u8>,
    #[serde(default)]
    pub buy: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CheeseEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            country: None,
            milk: None,
            texture: None,
            flavour: None,
            price_range: None,
            buy: false,
            notes: None,
            updated_at: Utc::now(),
        }
    }
}

domain_record!(CheeseEntry, Domain::Cheese, cheese);

/// A cellar entry (wine, spirits, beer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellarEntry {
    #[serde(skip)]
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub producer: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub abv: Option<String>,
    #[serde(default)]
    pub age_vintage: Option<String>,
    #[serde(default)]
    pub price_range: Option<u8>,
    #[serde(default)]
    pub buy: bool,
    #[serde(default)]
    pub tasting_notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CellarEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            producer: None,
            category: None,
            abv: None,
            age_vintage: None,
            price_range: None,
            buy: false,
            tasting_notes: None,
            updated_at: Utc::now(),
        }
    }
}

domain_record!(CellarEntry, Domain::Cellar, cellar);
