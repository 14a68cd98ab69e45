//! Record query routes
//!
//! GET /api/kyc/records translates query parameters through the query
//! service; malformed or unknown parameters come back as 400 BAD_QUERY.
//! GET /api/kyc/records/:doc_id returns the latest record for a document.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use std::collections::HashMap;

use super::ApiState;
use crate::error::QueryError;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/api/kyc/records", get(query_records))
        .route("/api/kyc/records/:doc_id", get(get_record))
}

async fn query_records(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.queries.query(&params).await {
        Ok(page) => Ok(Json(serde_json::json!(page))),
        Err(err) => {
            let status = match err {
                QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            Err((
                status,
                Json(serde_json::json!({
                    "error": err.code(),
                    "message": err.to_string(),
                })),
            ))
        }
    }
}

async fn get_record(
    State(state): State<ApiState>,
    Path(doc_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.store.get(&doc_id).await {
        Ok(Some(record)) => Ok(Json(serde_json::json!(record))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "NOT_FOUND",
                "message": format!("no run record for doc '{doc_id}'"),
            })),
        )),
        Err(err) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "STORE_READ_FAILURE",
                "message": err.to_string(),
            })),
        )),
    }
}
