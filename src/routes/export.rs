//! `/api/exportar`: every stored reading as delimited text.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use super::{blocking, ApiError, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/exportar", get(download))
}

async fn download(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    // ---
    let text = blocking(&state, |s| s.export_rows()).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"leituras.csv\"",
            ),
        ],
        text,
    ))
}
