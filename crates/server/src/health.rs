use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use shopper_agent::RecommendationClient;
use shopper_core::Catalog;

use crate::sessions::SessionRegistry;

#[derive(Clone)]
pub struct HealthState {
    catalog: Arc<Catalog>,
    client: RecommendationClient,
    sessions: SessionRegistry,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub catalog: HealthCheck,
    pub llm: HealthCheck,
    pub active_sessions: usize,
    pub checked_at: String,
}

pub fn router(
    catalog: Arc<Catalog>,
    client: RecommendationClient,
    sessions: SessionRegistry,
) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { catalog, client, sessions })
}

/// Always 200 once the catalogue is loaded; demo mode is reported, not failed.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let catalog = HealthCheck {
        status: "ready",
        detail: format!(
            "{} products loaded, {} in stock",
            state.catalog.len(),
            state.catalog.in_stock().len()
        ),
    };
    let llm = if state.client.is_demo_mode() {
        HealthCheck { status: "demo", detail: "no credential configured".to_string() }
    } else {
        HealthCheck {
            status: "ready",
            detail: format!("model {}", state.client.settings().model),
        }
    };

    let payload = HealthResponse {
        status: if llm.status == "ready" { "ready" } else { "demo" },
        service: HealthCheck {
            status: "ready",
            detail: "shopper-server runtime initialized".to_string(),
        },
        catalog,
        llm,
        active_sessions: state.sessions.len(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
