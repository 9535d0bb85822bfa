//! Dimension resolution: natural key to surrogate id.
//!
//! For each dimension the distinct natural keys in the batch are resolved
//! once each, carrying the first-seen attribute values. A key that fails to
//! resolve is recorded and skipped; the caller decides what that means for
//! the plants that reference it.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Dimension, PipelineError, ResolutionError};
use crate::models::{Botanist, CleanedReading, Country, Species};
use crate::store::{Resolved, StoreError, Warehouse};

// ---

/// Rows created per dimension during one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DimensionCounts {
    pub species: usize,
    pub countries: usize,
    pub botanists: usize,
}

/// Natural key to surrogate id, per dimension.
#[derive(Debug, Clone, Default)]
pub struct DimensionMaps {
    pub species: BTreeMap<String, i32>,
    pub countries: BTreeMap<String, i32>,
    pub botanists: BTreeMap<String, i32>,
    pub created: DimensionCounts,
    pub failures: Vec<ResolutionError>,
}

impl DimensionMaps {
    // ---
    pub fn resolved_keys(&self) -> usize {
        self.species.len() + self.countries.len() + self.botanists.len()
    }

    /// Surrogate ids for a reading, if all three of its keys resolved.
    pub fn ids_for(&self, reading: &CleanedReading) -> Option<(i32, i32, i32)> {
        Some((
            *self.species.get(&reading.scientific_name)?,
            *self.countries.get(&reading.country_name)?,
            *self.botanists.get(&reading.botanist_email)?,
        ))
    }
}

/// Distinct values keyed by natural key; the first row seen supplies the attributes.
fn distinct_by_key<T>(
    readings: &[CleanedReading],
    key: impl Fn(&CleanedReading) -> &str,
    build: impl Fn(&CleanedReading) -> T,
) -> BTreeMap<String, T> {
    // ---
    let mut distinct = BTreeMap::new();
    for reading in readings {
        distinct
            .entry(key(reading).to_string())
            .or_insert_with(|| build(reading));
    }
    distinct
}

/// Resolve every species, country and botanist referenced by the batch.
///
/// Only connection loss is raised; any other per-key failure is collected in
/// [`DimensionMaps::failures`].
pub async fn resolve_dimensions<W: Warehouse + ?Sized>(
    store: &mut W,
    readings: &[CleanedReading],
) -> Result<DimensionMaps, PipelineError> {
    // ---
    let mut maps = DimensionMaps::default();

    let species: BTreeMap<String, Species> =
        distinct_by_key(readings, |r| r.scientific_name.as_str(), CleanedReading::species);
    for (key, value) in &species {
        let outcome = store.resolve_species(value).await;
        record(
            Dimension::Species,
            key,
            outcome,
            &mut maps.species,
            &mut maps.created.species,
            &mut maps.failures,
        )?;
    }

    let countries: BTreeMap<String, Country> =
        distinct_by_key(readings, |r| r.country_name.as_str(), CleanedReading::country);
    for (key, value) in &countries {
        let outcome = store.resolve_country(value).await;
        record(
            Dimension::Country,
            key,
            outcome,
            &mut maps.countries,
            &mut maps.created.countries,
            &mut maps.failures,
        )?;
    }

    let botanists: BTreeMap<String, Botanist> =
        distinct_by_key(readings, |r| r.botanist_email.as_str(), CleanedReading::botanist);
    for (key, value) in &botanists {
        let outcome = store.resolve_botanist(value).await;
        record(
            Dimension::Botanist,
            key,
            outcome,
            &mut maps.botanists,
            &mut maps.created.botanists,
            &mut maps.failures,
        )?;
    }

    info!(
        "Resolved {} dimension keys ({} species, {} countries, {} botanists new), {} failed",
        maps.resolved_keys(),
        maps.created.species,
        maps.created.countries,
        maps.created.botanists,
        maps.failures.len()
    );
    Ok(maps)
}

fn record(
    dimension: Dimension,
    key: &str,
    outcome: Result<Resolved, StoreError>,
    ids: &mut BTreeMap<String, i32>,
    created: &mut usize,
    failures: &mut Vec<ResolutionError>,
) -> Result<(), PipelineError> {
    // ---
    match outcome {
        Ok(resolved) => {
            debug!(
                "{} '{}' -> {}{}",
                dimension,
                key,
                resolved.id,
                if resolved.created { " (new)" } else { "" }
            );
            if resolved.created {
                *created += 1;
            }
            ids.insert(key.to_string(), resolved.id);
            Ok(())
        }
        Err(StoreError::Connection(msg)) => Err(PipelineError::Connection(msg)),
        Err(e) => {
            let failure = ResolutionError {
                dimension,
                key: key.to_string(),
                reason: e.to_string(),
            };
            warn!("{}", failure);
            failures.push(failure);
            Ok(())
        }
    }
}
