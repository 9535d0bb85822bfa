use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;

use crate::storage::ColdStorage;
use crate::Config;

mod archive;
mod health;
mod pipeline;

// ---

/// Shared state for every route: database pool, configuration, cold storage.
pub type AppState = (PgPool, Config, Arc<dyn ColdStorage>);

pub fn router(pool: PgPool, config: Config, storage: Arc<dyn ColdStorage>) -> Router {
    // ---
    Router::new()
        .merge(pipeline::router())
        .merge(archive::router())
        .merge(health::router())
        .with_state((pool, config, storage))
}
