//! The closed set of record domains carried in a bundle.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A record domain. Each domain has exactly one concrete record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Recipes,
    Pizzas,
    Sandwiches,
    Smoking,
    Cheese,
    Cellar,
}

impl Domain {
    /// Every supported domain, in merge order.
    pub const ALL: [Domain; 6] = [
        Domain::Recipes,
        Domain::Pizzas,
        Domain::Sandwiches,
        Domain::Smoking,
        Domain::Cheese,
        Domain::Cellar,
    ];

    /// Stable string id, used as the bundle key and the store's domain column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Domain::Recipes => "recipes",
            Domain::Pizzas => "pizzas",
            Domain::Sandwiches => "sandwiches",
            Domain::Smoking => "smoking",
            Domain::Cheese => "cheese",
            Domain::Cellar => "cellar",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::UnknownDomain(s.to_string()))
    }
}
