//! Application entry point for the `plant-sensorflow` service.
//!
//! This binary orchestrates the full startup sequence, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the star schema if it does not exist
//! - Building the cold-storage client
//! - Starting the archive scheduler when a cadence is configured
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! See [`plant_sensorflow::config::load_from_env`] for the service settings.
//! Logging is controlled separately:
//! - `APP_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `APP_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use plant_sensorflow::archive::archive_today;
use plant_sensorflow::config::{self, mask_db_url};
use plant_sensorflow::storage::{ColdStorage, S3ColdStorage};
use plant_sensorflow::{routes, schema, Config};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let masked_url = mask_db_url(&cfg.db_url);
    tracing::info!("Attempting to connect to database: {}", masked_url);

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database '{}': {}", masked_url, e))?;

    tracing::info!("Successfully connected to database");

    if cfg.create_schema {
        schema::create_schema(&pool).await?;
    }

    let storage: Arc<dyn ColdStorage> = Arc::new(S3ColdStorage::connect(&cfg.s3_settings()).await);

    if cfg.archive_interval_secs > 0 {
        spawn_archive_scheduler(pool.clone(), cfg.clone(), Arc::clone(&storage));
    }

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(pool, cfg.clone(), storage);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Run the archiver on its own cadence, independent of pipeline requests.
///
/// A failed run is logged and retried at the next tick; the fact table is
/// left intact by a failed run so nothing is lost in between.
fn spawn_archive_scheduler(pool: PgPool, cfg: Config, storage: Arc<dyn ColdStorage>) {
    // ---
    let period = Duration::from_secs(cfg.archive_interval_secs);
    tracing::info!("Archive scheduler running every {:?}", period);

    tokio::spawn(async move {
        let settings = cfg.archive_settings();
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; skip it so startup does not archive.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match archive_today(&pool, &settings, storage.as_ref()).await {
                Ok(report) => tracing::info!(
                    "Scheduled archive wrote {} rows to '{}'",
                    report.rows_appended,
                    report.key
                ),
                Err(e) => tracing::error!("Scheduled archive failed: {}", e),
            }
        }
    });
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `APP_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to `APP_LOG_LEVEL`
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("APP_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("APP_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,aws_config=info,aws_smithy_runtime=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
