//! Plant linking: one bridge row per new plant id.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{info, warn};

use super::resolve::DimensionMaps;
use crate::error::PipelineError;
use crate::models::{CleanedReading, PlantLink};
use crate::store::{LinkStatus, Warehouse};

// ---

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkOutcome {
    /// Plant ids the fact loader may reference.
    pub accepted: BTreeSet<i32>,
    pub inserted: usize,
    pub existing: usize,
    /// Plant ids dropped because one of their natural keys did not resolve.
    pub unresolved: Vec<i32>,
}

/// Link each distinct plant id in the batch to its dimension ids.
///
/// The first reading seen for a plant supplies its keys. A plant that already
/// exists keeps its original links even if the batch disagrees.
pub async fn link_plants<W: Warehouse + ?Sized>(
    store: &mut W,
    readings: &[CleanedReading],
    maps: &DimensionMaps,
) -> Result<LinkOutcome, PipelineError> {
    // ---
    let mut first_seen: BTreeMap<i32, &CleanedReading> = BTreeMap::new();
    for reading in readings {
        first_seen.entry(reading.plant_id).or_insert(reading);
    }

    let mut outcome = LinkOutcome::default();
    for (plant_id, reading) in first_seen {
        let Some((species_id, country_id, botanist_id)) = maps.ids_for(reading) else {
            warn!("Plant {} has unresolved dimension keys; excluded", plant_id);
            outcome.unresolved.push(plant_id);
            continue;
        };

        let link = PlantLink {
            plant_id,
            species_id,
            country_id,
            botanist_id,
        };
        match store.link_plant(&link).await.map_err(PipelineError::insertion)? {
            LinkStatus::Inserted => outcome.inserted += 1,
            LinkStatus::Existing => outcome.existing += 1,
        }
        outcome.accepted.insert(plant_id);
    }

    info!(
        "Linked plants: {} new, {} existing, {} unresolved",
        outcome.inserted,
        outcome.existing,
        outcome.unresolved.len()
    );
    Ok(outcome)
}
