//! HTTP gateway for the telemetry service (EMBP).
//!
//! Each sibling module owns its endpoints and exports a subrouter; this
//! gateway merges them and attaches the shared [`TelemetryService`]. Core
//! operations are synchronous filesystem work, so handlers run them on the
//! blocking pool through [`blocking`].

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tracing::error;

use crate::{ErrorCategory, ServiceError, TelemetryService};

mod alerts;
mod export;
mod health;
mod readings;
mod settings;

// ---

pub(crate) type AppState = Arc<TelemetryService>;

pub fn router(service: Arc<TelemetryService>) -> Router {
    // ---
    Router::new()
        .merge(readings::router())
        .merge(alerts::router())
        .merge(settings::router())
        .merge(export::router())
        .merge(health::router())
        .with_state(service)
}

/// A [`ServiceError`] rendered as `{"error": {code, name, kind, description}}`.
///
/// Internal causes are logged here and replaced by an opaque description.
#[derive(Debug)]
pub(crate) struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let err = self.0;
        let (status, description) = match err.category() {
            ErrorCategory::ClientInput => (StatusCode::BAD_REQUEST, err.to_string()),
            ErrorCategory::Conflict => (StatusCode::CONFLICT, err.to_string()),
            ErrorCategory::Internal => {
                error!(error = %err, "internal error while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = json!({
            "error": {
                "code": status.as_u16(),
                "name": status.canonical_reason().unwrap_or_default(),
                "kind": err.kind(),
                "description": description,
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Run a core operation on the blocking pool.
pub(crate) async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&TelemetryService) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    // ---
    let service = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || op(&service))
        .await
        .map_err(|e| ServiceError::Internal(format!("blocking task failed: {e}")))?;
    Ok(result?)
}
