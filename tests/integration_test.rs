//! End-to-end checks against a running service and database.
//!
//! Run with `cargo test -- --ignored` once the service is up; `BASE_URL`
//! defaults to `http://localhost:8080`. The warehouse tests connect to
//! `DATABASE_URL` directly and roll back everything they write.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

use plant_sensorflow::models::{Botanist, Country, NewSensorReading, PlantLink, Species};
use plant_sensorflow::schema;
use plant_sensorflow::store::{LinkStatus, PgWarehouse, StoreError, Warehouse};

#[derive(Debug, Deserialize)]
struct Drops {
    completeness: usize,
    numeric_range: usize,
    temporal: usize,
    location: usize,
}

#[derive(Debug, Deserialize)]
struct RunReport {
    rows_in: usize,
    dropped: Drops,
    rows_cleaned: usize,
    facts_inserted: u64,
    readings_orphaned: usize,
    committed: bool,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

fn reading(plant_id: i64, soil_moisture: serde_json::Value, country: &str) -> serde_json::Value {
    // ---
    json!({
        "plant_id": plant_id,
        "plant_name": "Integration fern",
        "scientific_name": "Testus integratus",
        "soil_moisture": soil_moisture,
        "temperature": 21.5,
        "last_watered": "Thu, 28 Nov 2024 08:00:00 GMT",
        "recording_taken": "2024-11-28 13:37:24",
        "botanist_email": "integration@lnhm.co.uk",
        "botanist_forename": "Ada",
        "botanist_surname": "Tester",
        "botanist_phone": "555-0100",
        "country_name": country,
    })
}

#[tokio::test]
#[ignore = "requires a running service and database"]
async fn health_endpoints_respond() -> Result<()> {
    // ---
    let base = base_url();
    let client = Client::new();

    let health = client.get(format!("{}/health", base)).send().await?;
    assert_eq!(health.status(), StatusCode::OK);

    let ready = client.get(format!("{}/health/ready", base)).send().await?;
    assert_eq!(ready.status(), StatusCode::OK, "database should be reachable");

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running service and database"]
async fn load_endpoint_cleans_and_commits() -> Result<()> {
    // ---
    let url = format!("{}/pipeline/load", base_url());
    let batch = json!([
        reading(900_001, json!(42.0), "GB"),
        reading(900_002, json!("wet"), "GB"),
        reading(900_003, json!(40.0), ""),
    ]);

    let response = Client::new().post(&url).json(&batch).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let report: RunReport = response.json().await?;

    assert!(report.committed, "run should commit");
    assert_eq!(report.rows_in, 3);
    assert_eq!(report.rows_cleaned, 1);
    assert_eq!(report.dropped.completeness, 1, "empty country is a missing field");
    assert_eq!(report.dropped.numeric_range, 1, "non-numeric moisture is dropped");
    assert_eq!(report.dropped.temporal, 0);
    assert_eq!(report.dropped.location, 0);
    assert_eq!(report.facts_inserted, 1);
    assert_eq!(report.readings_orphaned, 0);

    Ok(())
}

// --- warehouse against PostgreSQL

async fn open_warehouse() -> Result<PgWarehouse> {
    // ---
    let url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new().max_connections(1).connect(&url).await?;
    schema::create_schema(&pool).await?;
    Ok(PgWarehouse::begin(&pool).await?)
}

fn unique_suffix() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

fn taken_at(minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 28)
        .unwrap()
        .and_hms_opt(13, minute % 60, 0)
        .unwrap()
}

fn fact(plant_id: i32, minute: u32) -> NewSensorReading {
    NewSensorReading {
        plant_id,
        recording_taken: taken_at(minute),
        last_watered: taken_at(0),
        soil_moisture: 40.0,
        temperature: 20.0,
    }
}

/// Resolve fresh dimension keys and link one plant; returns the plant id and
/// the scientific name that identifies this test's rows.
async fn seed_plant(store: &mut PgWarehouse, suffix: i64) -> Result<(i32, String)> {
    // ---
    let scientific_name = format!("Testus integratus {suffix}");
    let species = store
        .resolve_species(&Species {
            plant_name: "Integration fern".to_string(),
            scientific_name: scientific_name.clone(),
        })
        .await?;
    let country = store
        .resolve_country(&Country {
            country_name: format!("ZZ-{suffix}"),
        })
        .await?;
    let botanist = store
        .resolve_botanist(&Botanist {
            email: format!("integration-{suffix}@lnhm.co.uk"),
            forename: "Ada".to_string(),
            surname: "Tester".to_string(),
            phone: "555-0100".to_string(),
        })
        .await?;

    let plant_id = 1_000_000_000 + (suffix % 1_000_000_000) as i32;
    let status = store
        .link_plant(&PlantLink {
            plant_id,
            species_id: species.id,
            country_id: country.id,
            botanist_id: botanist.id,
        })
        .await?;
    assert_eq!(status, LinkStatus::Inserted);
    Ok((plant_id, scientific_name))
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn pg_resolution_returns_existing_ids() -> Result<()> {
    // ---
    let mut store = open_warehouse().await?;
    let suffix = unique_suffix();

    let species = Species {
        plant_name: "Integration fern".to_string(),
        scientific_name: format!("Testus integratus {suffix}"),
    };
    let first = store.resolve_species(&species).await?;
    let second = store.resolve_species(&species).await?;
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.id, second.id);

    let botanist = Botanist {
        email: format!("integration-{suffix}@lnhm.co.uk"),
        forename: "Ada".to_string(),
        surname: "Tester".to_string(),
        phone: "555-0100".to_string(),
    };
    let first = store.resolve_botanist(&botanist).await?;
    let renamed = Botanist {
        forename: "Augusta".to_string(),
        ..botanist
    };
    let second = store.resolve_botanist(&renamed).await?;
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.id, second.id);

    store.rollback().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn pg_rejected_fact_batch_leaves_no_rows() -> Result<()> {
    // ---
    let mut store = open_warehouse().await?;
    let (plant_id, scientific_name) = seed_plant(&mut store, unique_suffix()).await?;

    // Spans two insert chunks; the orphan sits in the second.
    let mut batch: Vec<NewSensorReading> = (0..1500).map(|i| fact(plant_id, i)).collect();
    batch.push(fact(-1, 0));

    let err = store.insert_readings(&batch).await.unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));

    let ours = |rows: &[plant_sensorflow::models::ArchiveRow]| {
        rows.iter().filter(|r| r.scientific_name == scientific_name).count()
    };
    assert_eq!(ours(&store.archive_rows().await?), 0);

    // The run transaction is still usable after the rejected batch.
    batch.pop();
    assert_eq!(store.insert_readings(&batch).await?, 1500);
    assert_eq!(ours(&store.archive_rows().await?), 1500);

    store.rollback().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn pg_existing_plant_is_not_relinked() -> Result<()> {
    // ---
    let mut store = open_warehouse().await?;
    let suffix = unique_suffix();
    let (plant_id, _) = seed_plant(&mut store, suffix).await?;

    let other = store
        .resolve_country(&Country {
            country_name: format!("YY-{suffix}"),
        })
        .await?;
    let status = store
        .link_plant(&PlantLink {
            plant_id,
            species_id: 0,
            country_id: other.id,
            botanist_id: 0,
        })
        .await?;
    assert_eq!(status, LinkStatus::Existing);

    store.rollback().await?;
    Ok(())
}
