//! REST API routes.

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::{parking, refresh, request_id, stats};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    let parking_routes = Router::new()
        .route("/v1/parking/nearby", get(parking::nearby))
        .route("/v1/parking/bounds", get(parking::in_bounds))
        .route("/v1/parking/geojson", get(parking::geojson))
        .route("/v1/parking/:id", get(parking::get_bay));

    let stats_routes = Router::new()
        .route("/v1/stats/overview", get(stats::overview))
        .route("/v1/stats/groups", get(stats::groups));

    let refresh_routes = Router::new()
        .route("/v1/refresh", post(refresh::trigger))
        .route("/v1/refresh/status", get(refresh::status));

    Router::new()
        .route("/health", get(health))
        .merge(parking_routes)
        .merge(stats_routes)
        .merge(refresh_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::ensure_request_id))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.snapshot();
    Json(json!({
        "status": "ok",
        "snapshot_version": snapshot.version(),
        "points": snapshot.len(),
        "built_at": snapshot.built_at(),
    }))
}
