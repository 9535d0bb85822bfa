//! Transform-and-load core.
//!
//! A run is one unit of work: clean the raw batch, resolve dimensions, link
//! plants, load facts, then commit. Any raised error rolls the unit of work
//! back so no part of the batch is left behind.

use serde::Serialize;
use tracing::{error, info};

use crate::alerts::{self, HealthThresholds, PlantAlert};
use crate::error::{PipelineError, ResolutionError, RunFailure};
use crate::models::RawReading;
use crate::store::Warehouse;

mod clean;
mod link;
mod load;
mod resolve;

pub use clean::{
    clean_batch, completeness_gate, location_gate, normalize_text, numeric_range_gate,
    parse_timestamp, temporal_gate, CleanedBatch, CleaningRules, GateDrops, GateOutcome,
    DEFAULT_MANDATORY_FIELDS,
};
pub use link::{link_plants, LinkOutcome};
pub use load::{load_facts, LoadOutcome};
pub use resolve::{resolve_dimensions, DimensionCounts, DimensionMaps};

// ---

/// Settings a pipeline run needs, derived once from [`crate::Config`].
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub cleaning: CleaningRules,
    pub health: HealthThresholds,
}

/// Counts for one run, reported whether or not it committed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    // ---
    pub rows_in: usize,
    pub dropped: GateDrops,
    pub rows_cleaned: usize,
    pub dimension_keys_resolved: usize,
    pub dimensions_created: DimensionCounts,
    pub resolution_failures: Vec<ResolutionError>,
    pub plants_inserted: usize,
    pub plants_existing: usize,
    pub plants_unresolved: Vec<i32>,
    pub facts_inserted: u64,
    pub readings_orphaned: usize,
    pub alerts: Vec<PlantAlert>,
    pub committed: bool,
}

/// Run the whole pipeline in `store` and commit, or roll back on failure.
pub async fn execute<W: Warehouse>(
    mut store: W,
    raw: Vec<RawReading>,
    settings: &PipelineSettings,
) -> Result<RunReport, RunFailure> {
    // ---
    let mut report = RunReport::default();

    let outcome = match run_stages(&mut store, raw, settings, &mut report).await {
        Ok(()) => store.commit().await.map_err(PipelineError::from),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            report.committed = true;
            info!(
                "Pipeline committed: {} rows in, {} dropped, {} facts inserted, {} orphaned",
                report.rows_in,
                report.dropped.total(),
                report.facts_inserted,
                report.readings_orphaned
            );
            Ok(report)
        }
        Err(source) => {
            error!("Pipeline run failed, rolling back: {}", source);
            if let Err(e) = store.rollback().await {
                error!("Rollback failed: {}", e);
            }
            // Nothing from this run is visible once it rolls back.
            report.facts_inserted = 0;
            report.plants_inserted = 0;
            report.dimensions_created = DimensionCounts::default();
            Err(RunFailure { report, source })
        }
    }
}

async fn run_stages<W: Warehouse>(
    store: &mut W,
    raw: Vec<RawReading>,
    settings: &PipelineSettings,
    report: &mut RunReport,
) -> Result<(), PipelineError> {
    // ---
    report.rows_in = raw.len();

    let cleaned = clean_batch(raw, &settings.cleaning);
    report.dropped = cleaned.drops;
    report.rows_cleaned = cleaned.readings.len();
    report.alerts = alerts::find_unhealthy(&cleaned.readings, &settings.health);

    if cleaned.readings.is_empty() {
        info!("No readings survived cleaning; nothing to load");
        return Ok(());
    }

    let maps = resolve_dimensions(store, &cleaned.readings).await?;
    report.dimension_keys_resolved = maps.resolved_keys();
    report.dimensions_created = maps.created;
    report.resolution_failures = maps.failures.clone();

    let linked = link_plants(store, &cleaned.readings, &maps).await?;
    report.plants_inserted = linked.inserted;
    report.plants_existing = linked.existing;
    report.plants_unresolved = linked.unresolved.clone();

    let loaded = load_facts(store, &cleaned.readings, &linked.accepted).await?;
    report.facts_inserted = loaded.inserted;
    report.readings_orphaned = loaded.orphaned;

    Ok(())
}
