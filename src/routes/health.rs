// src/routes/health.rs
//! Health endpoints for the plant-sensorflow service.
//!
//! - `GET /health` is a liveness probe: it answers as long as the process can
//!   serve HTTP and touches nothing else.
//! - `GET /health/ready` is a readiness probe: it also checks that the
//!   database answers a trivial query, since no pipeline or archive run can
//!   succeed without it.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the health endpoints.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        database: None,
    })
}

/// Handle `GET /health/ready`; `503` when the database is unreachable.
async fn ready(State((pool, _, _)): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    // ---
    match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: Some("ok"),
            }),
        ),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: Some("unreachable"),
                }),
            )
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}
