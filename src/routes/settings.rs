//! `/api/configuracoes`: read, replace and reset the live rule set.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use super::{blocking, ApiError, AppState};
use crate::rules::RuleSet;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/configuracoes", get(show).put(replace))
        .route("/api/configuracoes/reset", post(reset))
}

async fn show(State(state): State<AppState>) -> Result<Json<RuleSet>, ApiError> {
    Ok(Json(blocking(&state, |s| Ok(s.get_config())).await?))
}

/// `PUT /api/configuracoes` with a JSON `type -> {min, max}` body.
///
/// The body is taken raw so a bad payload is reported as an invalid payload
/// rather than an extractor rejection.
async fn replace(State(state): State<AppState>, body: Bytes) -> Result<Json<RuleSet>, ApiError> {
    // ---
    info!("PUT /api/configuracoes - {} bytes", body.len());
    let rules = blocking(&state, move |s| s.put_config(&body)).await?;
    Ok(Json(rules))
}

async fn reset(State(state): State<AppState>) -> Result<Json<RuleSet>, ApiError> {
    // ---
    info!("POST /api/configuracoes/reset");
    Ok(Json(blocking(&state, |s| s.reset_config()).await?))
}
