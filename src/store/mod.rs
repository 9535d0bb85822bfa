//! Relational store seam for the star schema.
//!
//! A [`Warehouse`] is one unit of work against the dimension, plant and fact
//! tables: every write goes into a single transaction that the caller either
//! commits or rolls back. [`PgWarehouse`] runs against PostgreSQL through
//! sqlx; [`MemoryDatabase`] hands out in-memory warehouses with the same
//! constraint behaviour.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ArchiveRow, Botanist, Country, NewSensorReading, PlantLink, Species};

mod memory;
mod postgres;

pub use memory::{MemoryDatabase, MemoryTables, MemoryWarehouse, SensorRow};
pub use postgres::PgWarehouse;

// ---

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    // ---
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("unit of work already committed or rolled back")]
    Closed,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // ---
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                StoreError::Constraint(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// Surrogate id for a natural key, and whether this call created the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: i32,
    pub created: bool,
}

/// Outcome of an insert-if-absent on the plant bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Inserted,
    Existing,
}

/// One transactional unit of work against the star schema.
///
/// Dimension resolution is a conditional upsert keyed on the natural key:
/// resolving a key that already exists returns the existing id and writes
/// nothing, so repeated or concurrent resolution converges on one row.
#[async_trait]
pub trait Warehouse: Send {
    // ---
    async fn resolve_species(&mut self, species: &Species) -> Result<Resolved, StoreError>;

    async fn resolve_country(&mut self, country: &Country) -> Result<Resolved, StoreError>;

    async fn resolve_botanist(&mut self, botanist: &Botanist) -> Result<Resolved, StoreError>;

    /// Insert the bridge row unless the plant id already exists. Existing
    /// plants are never re-linked.
    async fn link_plant(&mut self, plant: &PlantLink) -> Result<LinkStatus, StoreError>;

    /// Insert all readings or none of them.
    async fn insert_readings(&mut self, readings: &[NewSensorReading]) -> Result<u64, StoreError>;

    /// Inner join of every fact with its plant and dimensions. Holds the fact
    /// table against concurrent writers until the unit of work ends.
    async fn archive_rows(&mut self) -> Result<Vec<ArchiveRow>, StoreError>;

    async fn truncate_readings(&mut self) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}
