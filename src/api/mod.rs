//! REST API
//!
//! HTTP surface over the pipeline: a synchronous trigger endpoint, the
//! record query endpoints, and a side-effect-free liveness probe.

pub mod query_routes;
pub mod run_routes;

use axum::{http::StatusCode, response::Json, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::pipeline::Orchestrator;
use crate::store::{QueryService, RunStore};

/// Shared state for all API routes
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub queries: Arc<QueryService>,
    pub store: Arc<dyn RunStore>,
}

/// Assemble the full API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .merge(run_routes::router())
        .merge(query_routes::router())
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Liveness probe; no side effects
async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
