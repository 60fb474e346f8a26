use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CatalogConfig;
use crate::domain::product::{Category, Product, ProductId};
use crate::errors::CatalogError;

const EMBEDDED_CATALOG: &str = include_str!("../data/products.json");

/// Read-only product list, loaded once per process.
#[derive(Clone, Debug)]
pub struct Catalog {
    products: Vec<Product>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ProductFilter {
    pub category: Option<Category>,
    pub weather: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub in_stock: bool,
    pub search: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceRange {
    pub min: Decimal,
    pub max: Decimal,
    pub average: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub in_stock: usize,
    pub out_of_stock: usize,
    pub categories: BTreeMap<String, usize>,
    pub price_range: PriceRange,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        if products.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::with_capacity(products.len());
        for product in &products {
            if !seen.insert(product.id) {
                return Err(CatalogError::DuplicateId(product.id));
            }
        }

        Ok(Self { products })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let products = serde_json::from_str::<Vec<Product>>(raw)?;
        Self::new(products)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        let catalog = Self::from_json_str(&raw)?;
        debug!(
            event_name = "catalog.loaded",
            path = %path.display(),
            product_count = catalog.len(),
            "catalogue loaded from file"
        );
        Ok(catalog)
    }

    /// The demo catalogue compiled into the binary.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_json_str(EMBEDDED_CATALOG)
    }

    /// Configured catalogue file, or the embedded one when no path is set.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        match config.path.as_deref() {
            Some(path) => Self::load(path),
            None => Self::embedded(),
        }
    }

    pub fn all(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn find(&self, product_id: ProductId) -> Option<&Product> {
        self.products.iter().find(|product| product.id == product_id)
    }

    /// Resolves ids in the order given, skipping unknown ids and repeats.
    pub fn by_ids(&self, ids: &[ProductId]) -> Vec<Product> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.find(*id).cloned())
            .collect()
    }

    /// Highest product id, used as the upper bound when guessing ids from prose.
    pub fn max_id(&self) -> ProductId {
        self.products.iter().map(|product| product.id).max().unwrap_or(ProductId(0))
    }

    pub fn by_category(&self, category: Category) -> Vec<&Product> {
        self.products.iter().filter(|product| product.category == category).collect()
    }

    /// Products tagged for the given weather that are currently available.
    pub fn by_weather(&self, tag: &str) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|product| product.has_weather_tag(tag) && product.is_in_stock())
            .collect()
    }

    pub fn search(&self, query: &str) -> Vec<&Product> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.products.iter().filter(|product| matches_query(product, &query)).collect()
    }

    pub fn by_price_range(&self, min: Decimal, max: Decimal) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|product| product.price >= min && product.price <= max)
            .collect()
    }

    pub fn in_stock(&self) -> Vec<&Product> {
        self.products.iter().filter(|product| product.is_in_stock()).collect()
    }

    pub fn out_of_stock(&self) -> Vec<&Product> {
        self.products.iter().filter(|product| !product.is_in_stock()).collect()
    }

    pub fn advanced_search(&self, filter: &ProductFilter) -> Vec<&Product> {
        let weather = filter.weather.as_deref().map(str::trim).filter(|tag| !tag.is_empty());
        let search = filter
            .search
            .as_deref()
            .map(|query| query.trim().to_lowercase())
            .filter(|query| !query.is_empty());

        self.products
            .iter()
            .filter(|product| filter.category.map_or(true, |category| product.category == category))
            .filter(|product| weather.map_or(true, |tag| product.has_weather_tag(tag)))
            .filter(|product| filter.min_price.map_or(true, |min| product.price >= min))
            .filter(|product| filter.max_price.map_or(true, |max| product.price <= max))
            .filter(|product| !filter.in_stock || product.is_in_stock())
            .filter(|product| {
                search.as_deref().map_or(true, |query| {
                    product.name.to_lowercase().contains(query)
                        || product
                            .description
                            .as_deref()
                            .is_some_and(|description| description.to_lowercase().contains(query))
                })
            })
            .collect()
    }

    pub fn stats(&self) -> CatalogStats {
        let in_stock = self.products.iter().filter(|product| product.is_in_stock()).count();
        let categories = Category::ALL
            .iter()
            .map(|category| (category.label().to_string(), self.by_category(*category).len()))
            .collect();

        let prices = self.products.iter().map(|product| product.price);
        let min = prices.clone().min().unwrap_or_default();
        let max = prices.clone().max().unwrap_or_default();
        let sum: Decimal = prices.sum();
        let average = if self.products.is_empty() {
            Decimal::ZERO
        } else {
            (sum / Decimal::from(self.products.len())).round_dp(2)
        };

        CatalogStats {
            total: self.products.len(),
            in_stock,
            out_of_stock: self.products.len() - in_stock,
            categories,
            price_range: PriceRange { min, max, average },
        }
    }
}

fn matches_query(product: &Product, query: &str) -> bool {
    product.name.to_lowercase().contains(query)
        || product
            .description
            .as_deref()
            .is_some_and(|description| description.to_lowercase().contains(query))
        || product.category.label().to_lowercase().contains(query)
        || product.weather_tags.iter().any(|tag| tag.to_lowercase().contains(query))
}
