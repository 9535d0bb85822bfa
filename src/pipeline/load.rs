//! Fact loading: one sensor_data row per reading of an accepted plant.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::{CleanedReading, NewSensorReading};
use crate::store::Warehouse;

// ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub inserted: u64,
    pub orphaned: usize,
}

/// Insert the batch's readings for accepted plants as one atomic batch.
///
/// Readings whose plant id is not in `accepted` are discarded and counted as
/// orphans. If the store rejects any row the whole batch is rejected.
pub async fn load_facts<W: Warehouse + ?Sized>(
    store: &mut W,
    readings: &[CleanedReading],
    accepted: &BTreeSet<i32>,
) -> Result<LoadOutcome, PipelineError> {
    // ---
    let (facts, orphans): (Vec<&CleanedReading>, Vec<&CleanedReading>) = readings
        .iter()
        .partition(|r| accepted.contains(&r.plant_id));

    for orphan in &orphans {
        warn!(
            "Discarding reading for unknown plant {} taken at {}",
            orphan.plant_id, orphan.recording_taken
        );
    }

    let facts: Vec<NewSensorReading> = facts.into_iter().map(CleanedReading::to_fact).collect();
    let inserted = store
        .insert_readings(&facts)
        .await
        .map_err(PipelineError::insertion)?;

    info!(
        "Loaded {} sensor readings, discarded {} orphans",
        inserted,
        orphans.len()
    );
    Ok(LoadOutcome {
        inserted,
        orphaned: orphans.len(),
    })
}
