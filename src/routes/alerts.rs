//! `/api/alertas`: readings outside the current rules.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use super::{blocking, ApiError, AppState};
use crate::models::Alert;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/alertas", get(list))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Alert>>, ApiError> {
    // ---
    let alerts = blocking(&state, |s| s.list_alerts()).await?;
    Ok(Json(alerts))
}
