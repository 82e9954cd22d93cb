use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::handlers::{health_metrics, requests, stream};
use crate::AppState;

/// Builds the collector `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Ingestion + request records ─────────────────────────
        .route("/api/requests", post(requests::create))
        .route("/api/requests/list", get(requests::list))
        .route("/api/requests/table", get(requests::table))
        .route("/api/requests/search", get(requests::search))
        .route("/api/requests/count", get(requests::count))
        .route("/api/requests/:id", get(requests::get_by_id))
        // ── Health snapshots ────────────────────────────────────
        .route("/api/health-metrics/list", get(health_metrics::list))
        .route("/api/health-metrics/table", get(health_metrics::table))
        .route("/api/health-metrics/search", get(health_metrics::search))
        .route("/api/health-metrics/count", get(health_metrics::count))
        .route("/api/health-metrics/endpoint", get(health_metrics::by_endpoint))
        .route(
            "/api/health-metrics/recalculate",
            post(health_metrics::recalculate),
        )
        .route("/api/health-metrics/stream", get(stream::metrics_stream))
        .route("/api/health-metrics/:id", get(health_metrics::get_by_id))
        // ── Liveness ────────────────────────────────────────────
        .route("/health", get(|| async { Json(serde_json::json!({ "status": "UP" })) }))
        // ── Middleware (applied bottom-up) ──────────────────────
        .layer(axum_mw::from_fn_with_state(state.clone(), auth::require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
