use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopper_core::{Category, CatalogStats, Product, ProductFilter, ProductId};

use crate::api::{error, ApiResult, ApiState};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductsQuery {
    pub category: Option<String>,
    pub weather: Option<String>,
    pub q: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductsResponse {
    pub count: usize,
    pub products: Vec<Product>,
}

impl ProductsQuery {
    fn into_filter(self) -> Result<ProductFilter, String> {
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::parse::<Category>)
            .transpose()?;

        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(format!("min_price {min} is greater than max_price {max}"));
            }
        }

        Ok(ProductFilter {
            category,
            weather: self.weather,
            min_price: self.min_price,
            max_price: self.max_price,
            in_stock: self.in_stock.unwrap_or(false),
            search: self.q,
        })
    }
}

pub async fn list_products(
    State(state): State<ApiState>,
    Query(query): Query<ProductsQuery>,
) -> ApiResult<ProductsResponse> {
    let filter = query.into_filter().map_err(|message| error(StatusCode::BAD_REQUEST, message))?;
    let products: Vec<Product> = state.catalog.advanced_search(&filter).into_iter().cloned().collect();
    Ok(Json(ProductsResponse { count: products.len(), products }))
}

pub async fn get_product(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Product> {
    let product_id = id
        .trim()
        .parse::<u32>()
        .map(ProductId)
        .map_err(|_| error(StatusCode::BAD_REQUEST, format!("invalid product id `{id}`")))?;

    state
        .catalog
        .find(product_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("product {product_id} not found")))
}

pub async fn catalog_stats(State(state): State<ApiState>) -> Json<CatalogStats> {
    Json(state.catalog.stats())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use shopper_agent::{ClientSettings, RecommendationClient};
    use shopper_core::{Catalog, ProductId, ShoppingContext};

    use super::{catalog_stats, get_product, list_products, ProductsQuery};
    use crate::api::ApiState;
    use crate::sessions::SessionRegistry;

    fn state() -> State<ApiState> {
        let catalog = Arc::new(Catalog::embedded().expect("embedded catalogue"));
        let client = RecommendationClient::new(
            None,
            Arc::clone(&catalog),
            ClientSettings {
                model: "model-a".to_string(),
                temperature: 0.5,
                max_tokens: 300,
                timeout: Duration::from_secs(1),
            },
        );
        let sessions = SessionRegistry::new(client, ShoppingContext::default());
        State(ApiState { catalog, sessions })
    }

    #[tokio::test]
    async fn lists_every_product_without_filters() {
        let response = list_products(state(), Query(ProductsQuery::default()))
            .await
            .expect("listing succeeds");
        assert_eq!(response.count, 26);
    }

    #[tokio::test]
    async fn filters_by_category_weather_and_stock() {
        let query = ProductsQuery {
            category: Some("running".to_string()),
            weather: Some("froid".to_string()),
            in_stock: Some(true),
            ..ProductsQuery::default()
        };
        let response = list_products(state(), Query(query)).await.expect("listing succeeds");

        assert!(response.count > 0);
        assert!(response.products.iter().all(|product| product.is_in_stock()
            && product.has_weather_tag("froid")
            && product.category.label() == "Running"));
    }

    #[tokio::test]
    async fn rejects_unknown_category_and_inverted_price_range() {
        let query = ProductsQuery { category: Some("natation".to_string()), ..ProductsQuery::default() };
        let (status, _) = list_products(state(), Query(query)).await.err().expect("bad category");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let query = ProductsQuery {
            min_price: Some(Decimal::from(100)),
            max_price: Some(Decimal::from(10)),
            ..ProductsQuery::default()
        };
        let (status, body) = list_products(state(), Query(query)).await.err().expect("bad range");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("min_price"));
    }

    #[tokio::test]
    async fn product_lookup_handles_missing_and_malformed_ids() {
        let found = get_product(state(), Path("3".to_string())).await.expect("product 3");
        assert_eq!(found.id, ProductId(3));

        let (status, _) = get_product(state(), Path("999".to_string())).await.err().expect("missing");
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_product(state(), Path("abc".to_string())).await.err().expect("bad id");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_cover_the_whole_catalogue() {
        let stats = catalog_stats(state()).await;
        assert_eq!(stats.total, 26);
        assert_eq!(stats.in_stock + stats.out_of_stock, 26);
    }
}
