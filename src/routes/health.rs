// src/routes/health.rs
//! Liveness endpoint.
//!
//! `GET /health` answers without touching the record store. It does report
//! whether the submission schema loaded, since without it every ingest fails
//! with a server error.

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    schema: &'static str,
}

/// Handle `GET /health`.
async fn health(State(service): State<AppState>) -> Json<HealthResponse> {
    // ---
    let (status, schema) = if service.schema_available() {
        ("ok", "loaded")
    } else {
        ("degraded", "unavailable")
    };
    Json(HealthResponse { status, schema })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
