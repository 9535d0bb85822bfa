//! Pipeline endpoints.
//!
//! - `POST /pipeline/run`: fetch the configured plant range from the plant
//!   API, then clean and load it.
//! - `POST /pipeline/load`: clean and load a JSON array of raw rows supplied
//!   in the request body.
//!
//! Both answer `200` with the run report on commit and `500` with the error
//! and the partial report when the run was rolled back.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, error, info};

use super::AppState;
use crate::extract::PlantApiClient;
use crate::store::PgWarehouse;
use crate::{Config, RawReading, RunReport};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/pipeline/run", post(run_handler))
        .route("/pipeline/load", post(load_handler))
}

#[derive(Serialize)]
struct FailureBody {
    error: String,
    report: Option<RunReport>,
}

async fn run_handler(State((pool, config, _)): State<AppState>) -> Response {
    // ---
    info!("POST /pipeline/run - Starting pipeline");

    debug!("POST /pipeline/run - Step 1: fetch");
    let client = PlantApiClient::new(&config.api_url);
    let raw = client
        .fetch_range(config.plant_id_start..=config.plant_id_end)
        .await;

    debug!("POST /pipeline/run - Step 2: clean and load");
    run_and_respond(&pool, &config, raw).await
}

async fn load_handler(
    State((pool, config, _)): State<AppState>,
    Json(raw): Json<Vec<RawReading>>,
) -> Response {
    // ---
    info!("POST /pipeline/load - {} raw rows supplied", raw.len());
    run_and_respond(&pool, &config, raw).await
}

async fn run_and_respond(pool: &PgPool, config: &Config, raw: Vec<RawReading>) -> Response {
    // ---
    let store = match PgWarehouse::begin(pool).await {
        Ok(store) => store,
        Err(e) => {
            error!("Could not open a database transaction: {}", e);
            let body = FailureBody {
                error: e.to_string(),
                report: None,
            };
            return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
        }
    };

    match crate::pipeline::execute(store, raw, &config.pipeline_settings()).await {
        Ok(report) => {
            debug!("Pipeline committed - Returning OK");
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(failure) => {
            let body = FailureBody {
                error: failure.source.to_string(),
                report: Some(failure.report),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
