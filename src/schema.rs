//! Database schema management for `plant-sensorflow`.
//!
//! Ensures the star schema exists before serving requests. Applied once on
//! startup from `main.rs` (EMBP: single gateway call) unless disabled, for
//! deployments where the tables are provisioned elsewhere.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Statements in dependency order: dimensions, bridge, fact.
const SCHEMA_STATEMENTS: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS species (
        species_id      SERIAL PRIMARY KEY,
        plant_name      TEXT NOT NULL,
        scientific_name TEXT NOT NULL UNIQUE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS country (
        country_id   SERIAL PRIMARY KEY,
        country_name TEXT NOT NULL UNIQUE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS botanist (
        botanist_id SERIAL PRIMARY KEY,
        email       TEXT NOT NULL UNIQUE,
        forename    TEXT NOT NULL,
        surname     TEXT NOT NULL,
        phone       TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS plant (
        plant_id    INTEGER PRIMARY KEY,
        species_id  INTEGER NOT NULL REFERENCES species (species_id),
        country_id  INTEGER NOT NULL REFERENCES country (country_id),
        botanist_id INTEGER NOT NULL REFERENCES botanist (botanist_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sensor_data (
        sensor_data_id  SERIAL PRIMARY KEY,
        plant_id        INTEGER          NOT NULL REFERENCES plant (plant_id),
        recording_taken TIMESTAMP        NOT NULL,
        last_watered    TIMESTAMP        NOT NULL,
        soil_moisture   DOUBLE PRECISION NOT NULL CHECK (soil_moisture BETWEEN 0 AND 100),
        temperature     DOUBLE PRECISION NOT NULL CHECK (temperature BETWEEN -10 AND 50)
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_sensor_data_plant_id
        ON sensor_data (plant_id);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_sensor_data_recording_taken
        ON sensor_data (recording_taken);
    "#,
];

/// Create the star schema (idempotent).
///
/// Natural keys carry `UNIQUE` constraints so dimension resolution can use
/// `ON CONFLICT`. Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!("Star schema verified");
    Ok(())
}
