use super::{Result, decode};
use crate::router::{RouteDecision, RouteRequest, RouterCache};
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// HTTP surface of a routing process.
pub fn routing_router(cache: Arc<RouterCache>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/route", post(route))
        .layer(TraceLayer::new_for_http())
        .with_state(cache)
}

async fn health(State(cache): State<Arc<RouterCache>>) -> Json<Value> {
    let age_ms = cache
        .cache_age()
        .await
        .map(|age| age.as_millis() as u64);
    Json(json!({ "status": "ok", "cacheAgeMs": age_ms }))
}

async fn route(
    State(cache): State<Arc<RouterCache>>,
    body: Bytes,
) -> Result<Json<RouteDecision>> {
    let request: RouteRequest = decode(&body)?;
    Ok(Json(cache.route(request).await?))
}
