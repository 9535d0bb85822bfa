//! Archiver: drain the live fact table into cold storage.
//!
//! Steps, in order: join facts with every dimension, download the period's
//! archive object (if any), rebuild it in memory with the new rows appended,
//! upload it, and only then truncate the fact table and commit. Any failure
//! before the upload completes rolls back and leaves the fact table intact.

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info};

use crate::error::PipelineError;
use crate::models::ArchiveRow;
use crate::storage::ColdStorage;
use crate::store::{PgWarehouse, Warehouse};

// ---

/// Column order of every archive object.
pub const ARCHIVE_COLUMNS: [&str; 9] = [
    "recording_taken",
    "last_watered",
    "plant_name",
    "scientific_name",
    "soil_moisture",
    "temperature",
    "country_name",
    "botanist_forename",
    "botanist_surname",
];

pub const DEFAULT_KEY_PATTERN: &str = "{year}-{month}/{day}_plants_data.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub key_pattern: String,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            key_pattern: DEFAULT_KEY_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub key: String,
    pub rows_before: usize,
    pub rows_appended: usize,
    pub rows_total: usize,
    pub truncated: bool,
}

/// Render an object key: `{year}`, `{month}` and `{day}` are replaced with
/// unpadded numbers from `date`.
pub fn archive_key(pattern: &str, date: NaiveDate) -> String {
    // ---
    pattern
        .replace("{year}", &date.year().to_string())
        .replace("{month}", &date.month().to_string())
        .replace("{day}", &date.day().to_string())
}

/// Rebuild an archive object: the existing records (if any) followed by
/// `rows`. Returns the new bytes and the number of records carried over.
pub fn append_rows(
    key: &str,
    existing: Option<&[u8]>,
    rows: &[ArchiveRow],
) -> Result<(Vec<u8>, usize), PipelineError> {
    // ---
    let corrupt = |reason: String| PipelineError::CorruptArchive {
        key: key.to_string(),
        reason,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(ARCHIVE_COLUMNS)
        .map_err(|e| corrupt(e.to_string()))?;

    let mut carried = 0usize;
    if let Some(bytes) = existing.filter(|b| !b.is_empty()) {
        let mut reader = csv::Reader::from_reader(bytes);
        let headers = reader.headers().map_err(|e| corrupt(e.to_string()))?;
        if headers.iter().ne(ARCHIVE_COLUMNS) {
            return Err(corrupt(format!("unexpected header {:?}", headers)));
        }
        for record in reader.records() {
            let record = record.map_err(|e| corrupt(e.to_string()))?;
            writer
                .write_record(&record)
                .map_err(|e| corrupt(e.to_string()))?;
            carried += 1;
        }
    }

    for row in rows {
        writer
            .write_record(&[
                row.recording_taken.format(TIMESTAMP_FORMAT).to_string(),
                row.last_watered.format(TIMESTAMP_FORMAT).to_string(),
                row.plant_name.clone(),
                row.scientific_name.clone(),
                row.soil_moisture.to_string(),
                row.temperature.to_string(),
                row.country_name.clone(),
                row.botanist_forename.clone(),
                row.botanist_surname.clone(),
            ])
            .map_err(|e| corrupt(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| corrupt(e.to_string()))?;
    Ok((bytes, carried))
}

/// Archive into today's object using a fresh transaction from `pool`.
pub async fn archive_today(
    pool: &PgPool,
    settings: &ArchiveSettings,
    storage: &dyn ColdStorage,
) -> Result<ArchiveReport, PipelineError> {
    // ---
    let key = archive_key(&settings.key_pattern, Local::now().date_naive());
    let store = PgWarehouse::begin(pool).await?;
    run_archive(store, storage, &key).await
}

/// Run the archiver once against `store`, writing to `key` in `storage`.
pub async fn run_archive<W, S>(
    mut store: W,
    storage: &S,
    key: &str,
) -> Result<ArchiveReport, PipelineError>
where
    W: Warehouse,
    S: ColdStorage + ?Sized,
{
    // ---
    match archive_stages(&mut store, storage, key).await {
        Ok(report) => {
            store.commit().await?;
            info!(
                "Archived {} rows to '{}' ({} total)",
                report.rows_appended, report.key, report.rows_total
            );
            Ok(report)
        }
        Err(e) => {
            error!("Archive run failed, fact table left intact: {}", e);
            if let Err(rb) = store.rollback().await {
                error!("Rollback failed: {}", rb);
            }
            Err(e)
        }
    }
}

async fn archive_stages<W, S>(
    store: &mut W,
    storage: &S,
    key: &str,
) -> Result<ArchiveReport, PipelineError>
where
    W: Warehouse,
    S: ColdStorage + ?Sized,
{
    // ---
    let rows = store.archive_rows().await?;
    info!("Archiving {} joined sensor rows to '{}'", rows.len(), key);

    if rows.is_empty() {
        return Ok(ArchiveReport {
            key: key.to_string(),
            rows_before: 0,
            rows_appended: 0,
            rows_total: 0,
            truncated: false,
        });
    }

    let existing = storage
        .get(key)
        .await
        .map_err(|source| PipelineError::Download {
            key: key.to_string(),
            source,
        })?;

    let (bytes, rows_before) = append_rows(key, existing.as_deref(), &rows)?;

    storage
        .put(key, bytes)
        .await
        .map_err(|source| PipelineError::Upload {
            key: key.to_string(),
            source,
        })?;

    store.truncate_readings().await?;

    Ok(ArchiveReport {
        key: key.to_string(),
        rows_before,
        rows_appended: rows.len(),
        rows_total: rows_before + rows.len(),
        truncated: true,
    })
}
