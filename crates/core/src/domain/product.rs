use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u32);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Randonnée")]
    Randonnee,
    Running,
    #[serde(rename = "Vélo")]
    Velo,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Randonnee, Category::Running, Category::Velo];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Randonnee => "Randonnée",
            Self::Running => "Running",
            Self::Velo => "Vélo",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "randonnée" | "randonnee" | "hiking" => Ok(Self::Randonnee),
            "running" => Ok(Self::Running),
            "vélo" | "velo" | "cycling" => Ok(Self::Velo),
            other => Err(format!("unknown category `{other}` (expected randonnée|running|vélo)")),
        }
    }
}

/// A catalogue entry. Immutable for the lifetime of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: Category,
    pub price: Decimal,
    #[serde(default)]
    pub weather_tags: BTreeSet<String>,
    pub stock_level: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Product {
    pub fn is_in_stock(&self) -> bool {
        self.stock_level > 0
    }

    pub fn has_weather_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        self.weather_tags.iter().any(|candidate| candidate.to_lowercase() == tag)
    }
}
