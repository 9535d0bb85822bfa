//! In-memory [`Warehouse`] with the same key and foreign-key rules as the
//! PostgreSQL schema.
//!
//! A [`MemoryDatabase`] holds the committed tables. Each [`MemoryWarehouse`]
//! works on a private copy taken at `begin()` and writes it back on commit,
//! so a rolled-back run leaves no trace. Used for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{LinkStatus, Resolved, StoreError, Warehouse};
use crate::models::{ArchiveRow, Botanist, Country, NewSensorReading, PlantLink, Species};

// ---

#[derive(Debug, Clone, PartialEq)]
pub struct SensorRow {
    pub sensor_data_id: i32,
    pub reading: NewSensorReading,
}

/// Snapshot of every table plus insert counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    // ---
    pub species: BTreeMap<i32, Species>,
    pub countries: BTreeMap<i32, Country>,
    pub botanists: BTreeMap<i32, Botanist>,
    pub plants: BTreeMap<i32, PlantLink>,
    pub readings: Vec<SensorRow>,

    /// Total dimension rows ever inserted, across all tables.
    pub dimension_inserts: usize,

    next_species_id: i32,
    next_country_id: i32,
    next_botanist_id: i32,
    next_sensor_data_id: i32,
}

impl MemoryTables {
    // ---
    fn next_id(counter: &mut i32) -> i32 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_fact_inserts: bool,
    rejected_keys: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<MemoryTables>,
    faults: Mutex<Faults>,
}

/// Committed state shared by every warehouse it hands out.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Connection("memory store lock poisoned".to_string()))
}

impl MemoryDatabase {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a unit of work on a copy of the committed tables.
    pub fn begin(&self) -> Result<MemoryWarehouse, StoreError> {
        // ---
        let working = lock(&self.shared.tables)?.clone();
        Ok(MemoryWarehouse {
            shared: Arc::clone(&self.shared),
            working: Some(working),
        })
    }

    /// Copy of the committed tables.
    pub fn snapshot(&self) -> Result<MemoryTables, StoreError> {
        Ok(lock(&self.shared.tables)?.clone())
    }

    /// Make every subsequent fact batch fail as a constraint violation.
    pub fn fail_fact_inserts(&self, fail: bool) -> Result<(), StoreError> {
        lock(&self.shared.faults)?.fail_fact_inserts = fail;
        Ok(())
    }

    /// Make resolution of a natural key fail as a constraint violation.
    pub fn reject_key(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.shared.faults)?.rejected_keys.insert(key.to_string());
        Ok(())
    }
}

pub struct MemoryWarehouse {
    shared: Arc<Shared>,
    working: Option<MemoryTables>,
}

impl MemoryWarehouse {
    // ---
    fn tables(&mut self) -> Result<&mut MemoryTables, StoreError> {
        self.working.as_mut().ok_or(StoreError::Closed)
    }

    fn check_key(&self, key: &str) -> Result<(), StoreError> {
        // ---
        if lock(&self.shared.faults)?.rejected_keys.contains(key) {
            return Err(StoreError::Constraint(format!(
                "duplicate key value violates unique constraint for '{key}'"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    // ---
    async fn resolve_species(&mut self, species: &Species) -> Result<Resolved, StoreError> {
        // ---
        self.check_key(&species.scientific_name)?;
        let t = self.tables()?;
        if let Some((&id, _)) = t
            .species
            .iter()
            .find(|(_, s)| s.scientific_name == species.scientific_name)
        {
            return Ok(Resolved { id, created: false });
        }
        let id = MemoryTables::next_id(&mut t.next_species_id);
        t.species.insert(id, species.clone());
        t.dimension_inserts += 1;
        Ok(Resolved { id, created: true })
    }

    async fn resolve_country(&mut self, country: &Country) -> Result<Resolved, StoreError> {
        // ---
        self.check_key(&country.country_name)?;
        let t = self.tables()?;
        if let Some((&id, _)) = t
            .countries
            .iter()
            .find(|(_, c)| c.country_name == country.country_name)
        {
            return Ok(Resolved { id, created: false });
        }
        let id = MemoryTables::next_id(&mut t.next_country_id);
        t.countries.insert(id, country.clone());
        t.dimension_inserts += 1;
        Ok(Resolved { id, created: true })
    }

    async fn resolve_botanist(&mut self, botanist: &Botanist) -> Result<Resolved, StoreError> {
        // ---
        self.check_key(&botanist.email)?;
        let t = self.tables()?;
        if let Some((&id, _)) = t.botanists.iter().find(|(_, b)| b.email == botanist.email) {
            return Ok(Resolved { id, created: false });
        }
        let id = MemoryTables::next_id(&mut t.next_botanist_id);
        t.botanists.insert(id, botanist.clone());
        t.dimension_inserts += 1;
        Ok(Resolved { id, created: true })
    }

    async fn link_plant(&mut self, plant: &PlantLink) -> Result<LinkStatus, StoreError> {
        // ---
        let t = self.tables()?;
        if t.plants.contains_key(&plant.plant_id) {
            return Ok(LinkStatus::Existing);
        }
        if !t.species.contains_key(&plant.species_id)
            || !t.countries.contains_key(&plant.country_id)
            || !t.botanists.contains_key(&plant.botanist_id)
        {
            return Err(StoreError::Constraint(format!(
                "plant {} references a missing dimension row",
                plant.plant_id
            )));
        }
        t.plants.insert(plant.plant_id, *plant);
        Ok(LinkStatus::Inserted)
    }

    async fn insert_readings(&mut self, readings: &[NewSensorReading]) -> Result<u64, StoreError> {
        // ---
        if lock(&self.shared.faults)?.fail_fact_inserts {
            return Err(StoreError::Constraint(
                "sensor_data insert rejected".to_string(),
            ));
        }
        let t = self.tables()?;
        if let Some(orphan) = readings.iter().find(|r| !t.plants.contains_key(&r.plant_id)) {
            return Err(StoreError::Constraint(format!(
                "sensor_data references missing plant {}",
                orphan.plant_id
            )));
        }
        for reading in readings {
            let sensor_data_id = MemoryTables::next_id(&mut t.next_sensor_data_id);
            t.readings.push(SensorRow {
                sensor_data_id,
                reading: reading.clone(),
            });
        }
        Ok(readings.len() as u64)
    }

    async fn archive_rows(&mut self) -> Result<Vec<ArchiveRow>, StoreError> {
        // ---
        let t = self.tables()?;
        let mut rows: Vec<(i32, ArchiveRow)> = t
            .readings
            .iter()
            .filter_map(|row| {
                let r = &row.reading;
                let plant = t.plants.get(&r.plant_id)?;
                let species = t.species.get(&plant.species_id)?;
                let country = t.countries.get(&plant.country_id)?;
                let botanist = t.botanists.get(&plant.botanist_id)?;
                Some((
                    row.sensor_data_id,
                    ArchiveRow {
                        recording_taken: r.recording_taken,
                        last_watered: r.last_watered,
                        plant_name: species.plant_name.clone(),
                        scientific_name: species.scientific_name.clone(),
                        soil_moisture: r.soil_moisture,
                        temperature: r.temperature,
                        country_name: country.country_name.clone(),
                        botanist_forename: botanist.forename.clone(),
                        botanist_surname: botanist.surname.clone(),
                    },
                ))
            })
            .collect();
        rows.sort_by(|a, b| {
            a.1.recording_taken
                .cmp(&b.1.recording_taken)
                .then(a.0.cmp(&b.0))
        });
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    async fn truncate_readings(&mut self) -> Result<(), StoreError> {
        // ---
        self.tables()?.readings.clear();
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        // ---
        let working = self.working.take().ok_or(StoreError::Closed)?;
        *lock(&self.shared.tables)? = working;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        // ---
        self.working.take().ok_or(StoreError::Closed)?;
        Ok(())
    }
}
