use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use shopper_core::Catalog;

use crate::products;
use crate::sessions::{self, SessionRegistry};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error: message.into() }))
}

#[derive(Clone)]
pub struct ApiState {
    pub catalog: Arc<Catalog>,
    pub sessions: SessionRegistry,
}

pub fn router(catalog: Arc<Catalog>, sessions: SessionRegistry) -> Router {
    Router::new()
        .route("/api/v1/products", get(products::list_products))
        .route("/api/v1/products/stats", get(products::catalog_stats))
        .route("/api/v1/products/{id}", get(products::get_product))
        .route("/api/v1/sessions", post(sessions::create_session))
        .route(
            "/api/v1/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/api/v1/sessions/{id}/messages",
            post(sessions::send_message).delete(sessions::clear_messages),
        )
        .route("/api/v1/sessions/{id}/context", axum::routing::put(sessions::update_context))
        .with_state(ApiState { catalog, sessions })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use shopper_agent::{ClientSettings, RecommendationClient};
    use shopper_core::{Catalog, ShoppingContext};
    use tower::ServiceExt;

    use super::router;
    use crate::sessions::SessionRegistry;

    fn app() -> axum::Router {
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
        router(catalog, SessionRegistry::new(client, ShoppingContext::default()))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn routes_resolve_product_paths() {
        let response = app()
            .oneshot(Request::get("/api/v1/products/1").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], 1);

        let response = app()
            .oneshot(Request::get("/api/v1/products/stats").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["total"], 26);
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let app = app();

        let created = app
            .clone()
            .oneshot(Request::post("/api/v1/sessions").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(created.status(), StatusCode::CREATED);
        let id = body_json(created).await["id"].as_str().expect("session id").to_string();

        let sent = app
            .clone()
            .oneshot(
                Request::post(format!("/api/v1/sessions/{id}/messages"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text":"une veste"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(sent.status(), StatusCode::OK);
        let payload = body_json(sent).await;
        assert_eq!(payload["outcome"], "completed");
        assert_eq!(payload["session"]["messages"].as_array().map(Vec::len), Some(2));

        let cleared = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/v1/sessions/{id}/messages"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(cleared.status(), StatusCode::OK);
        assert_eq!(body_json(cleared).await["messages"].as_array().map(Vec::len), Some(0));

        let deleted = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/v1/sessions/{id}")).body(Body::empty()).expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let missing = app
            .oneshot(Request::get(format!("/api/v1/sessions/{id}")).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
