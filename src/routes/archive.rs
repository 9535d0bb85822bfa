//! `POST /archive/run`: drain the fact table into today's archive object now,
//! independent of the scheduled cadence.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::archive::archive_today;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/archive/run", post(handler))
}

async fn handler(State((pool, config, storage)): State<AppState>) -> impl IntoResponse {
    // ---
    info!("POST /archive/run - Starting archive");

    match archive_today(&pool, &config.archive_settings(), storage.as_ref()).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!("Archive run failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
