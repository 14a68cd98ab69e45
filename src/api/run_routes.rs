//! Trigger route
//!
//! POST /api/kyc/run accepts the trigger payload, drives the run to a
//! terminal state, and returns the run record synchronously. A failed run
//! is still a 200: the failure is described on the record. Only a store
//! write failure surfaces as 500, since the computed result was lost from
//! durable storage.

use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};

use super::ApiState;
use crate::pipeline::{RunReport, Trigger};

pub fn router() -> Router<ApiState> {
    Router::new().route("/api/kyc/run", post(run_pipeline))
}

async fn run_pipeline(
    State(state): State<ApiState>,
    Json(trigger): Json<Trigger>,
) -> (StatusCode, Json<RunReport>) {
    let report = state.orchestrator.run(trigger).await;
    let status = if report.persisted {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}
