//! `/api/leituras`: submit, list and clear readings.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use super::{blocking, ApiError, AppState};
use crate::models::CanonicalRecord;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route(
        "/api/leituras",
        post(submit).get(list).delete(delete_all),
    )
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    message: &'static str,
    id: String,
    greenhouse_id: String,
    readings: usize,
    out_of_range: usize,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    message: String,
    deleted: usize,
}

/// `POST /api/leituras` with an XML body.
async fn submit(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    // ---
    info!("POST /api/leituras - {} bytes", body.len());
    let accepted = blocking(&state, move |s| s.ingest(&body)).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            message: "submission accepted",
            id: accepted.record_id,
            greenhouse_id: accepted.greenhouse_id,
            readings: accepted.readings,
            out_of_range: accepted.out_of_range,
        }),
    ))
}

/// `GET /api/leituras`
async fn list(State(state): State<AppState>) -> Result<Json<Vec<CanonicalRecord>>, ApiError> {
    // ---
    let records = blocking(&state, |s| s.list_records()).await?;
    Ok(Json(records))
}

/// `DELETE /api/leituras`
async fn delete_all(State(state): State<AppState>) -> Result<Json<DeleteResponse>, ApiError> {
    // ---
    let deleted = blocking(&state, |s| s.delete_all_records()).await?;
    Ok(Json(DeleteResponse {
        message: format!("{deleted} records deleted"),
        deleted,
    }))
}
