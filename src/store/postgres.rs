//! PostgreSQL-backed [`Warehouse`].
//!
//! One `PgWarehouse` owns one transaction for the lifetime of a pipeline or
//! archiver run. Per-key and per-batch writes run inside savepoints so a
//! failing statement can be undone without aborting the run transaction.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};

use super::{LinkStatus, Resolved, StoreError, Warehouse};
use crate::models::{ArchiveRow, Botanist, Country, NewSensorReading, PlantLink, Species};

// ---

/// Rows per multi-row INSERT; 5 binds each keeps well under the protocol limit.
const FACT_CHUNK_ROWS: usize = 1000;

const RESOLVE_SPECIES_SQL: &str = r#"
    WITH inserted AS (
        INSERT INTO species (plant_name, scientific_name)
        VALUES ($1, $2)
        ON CONFLICT (scientific_name) DO NOTHING
        RETURNING species_id
    )
    SELECT species_id, TRUE AS created FROM inserted
    UNION ALL
    SELECT species_id, FALSE AS created FROM species WHERE scientific_name = $2
    LIMIT 1
"#;

const RESOLVE_COUNTRY_SQL: &str = r#"
    WITH inserted AS (
        INSERT INTO country (country_name)
        VALUES ($1)
        ON CONFLICT (country_name) DO NOTHING
        RETURNING country_id
    )
    SELECT country_id, TRUE AS created FROM inserted
    UNION ALL
    SELECT country_id, FALSE AS created FROM country WHERE country_name = $1
    LIMIT 1
"#;

const RESOLVE_BOTANIST_SQL: &str = r#"
    WITH inserted AS (
        INSERT INTO botanist (email, forename, surname, phone)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO NOTHING
        RETURNING botanist_id
    )
    SELECT botanist_id, TRUE AS created FROM inserted
    UNION ALL
    SELECT botanist_id, FALSE AS created FROM botanist WHERE email = $1
    LIMIT 1
"#;

const ARCHIVE_JOIN_SQL: &str = r#"
    SELECT
        s.recording_taken,
        s.last_watered,
        sp.plant_name,
        sp.scientific_name,
        s.soil_moisture,
        s.temperature,
        c.country_name,
        b.forename AS botanist_forename,
        b.surname  AS botanist_surname
    FROM sensor_data s
    JOIN plant    p  ON p.plant_id     = s.plant_id
    JOIN species  sp ON sp.species_id  = p.species_id
    JOIN country  c  ON c.country_id   = p.country_id
    JOIN botanist b  ON b.botanist_id  = p.botanist_id
    ORDER BY s.recording_taken, s.sensor_data_id
"#;

pub struct PgWarehouse {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgWarehouse {
    // ---
    /// Open a unit of work on a pooled connection.
    pub async fn begin(pool: &PgPool) -> Result<Self, StoreError> {
        // ---
        let tx = pool.begin().await?;
        tracing::debug!("Opened warehouse transaction");
        Ok(Self { tx: Some(tx) })
    }

    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::Closed)
    }

    /// Finish a conditional upsert: the CTE result if any, otherwise a fresh
    /// lookup for a row committed by a concurrent writer after our snapshot.
    async fn settle(
        conn: &mut PgConnection,
        upserted: Option<(i32, bool)>,
        lookup_sql: &str,
        key: &str,
    ) -> Result<Resolved, StoreError> {
        // ---
        if let Some((id, created)) = upserted {
            return Ok(Resolved { id, created });
        }
        let id: Option<i32> = sqlx::query_scalar(lookup_sql)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        id.map(|id| Resolved { id, created: false })
            .ok_or_else(|| StoreError::Query(format!("no row for natural key '{key}' after upsert")))
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    // ---
    async fn resolve_species(&mut self, species: &Species) -> Result<Resolved, StoreError> {
        // ---
        let conn = self.conn()?;
        let mut savepoint = conn.begin().await?;
        let upserted = sqlx::query_as::<_, (i32, bool)>(RESOLVE_SPECIES_SQL)
            .bind(&species.plant_name)
            .bind(&species.scientific_name)
            .fetch_optional(&mut *savepoint)
            .await;
        let upserted = match upserted {
            Ok(row) => row,
            Err(e) => {
                savepoint.rollback().await?;
                return Err(e.into());
            }
        };
        let resolved = Self::settle(
            &mut savepoint,
            upserted,
            "SELECT species_id FROM species WHERE scientific_name = $1",
            &species.scientific_name,
        )
        .await;
        match resolved {
            Ok(r) => {
                savepoint.commit().await?;
                Ok(r)
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e)
            }
        }
    }

    async fn resolve_country(&mut self, country: &Country) -> Result<Resolved, StoreError> {
        // ---
        let conn = self.conn()?;
        let mut savepoint = conn.begin().await?;
        let upserted = sqlx::query_as::<_, (i32, bool)>(RESOLVE_COUNTRY_SQL)
            .bind(&country.country_name)
            .fetch_optional(&mut *savepoint)
            .await;
        let upserted = match upserted {
            Ok(row) => row,
            Err(e) => {
                savepoint.rollback().await?;
                return Err(e.into());
            }
        };
        let resolved = Self::settle(
            &mut savepoint,
            upserted,
            "SELECT country_id FROM country WHERE country_name = $1",
            &country.country_name,
        )
        .await;
        match resolved {
            Ok(r) => {
                savepoint.commit().await?;
                Ok(r)
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e)
            }
        }
    }

    async fn resolve_botanist(&mut self, botanist: &Botanist) -> Result<Resolved, StoreError> {
        // ---
        let conn = self.conn()?;
        let mut savepoint = conn.begin().await?;
        let upserted = sqlx::query_as::<_, (i32, bool)>(RESOLVE_BOTANIST_SQL)
            .bind(&botanist.email)
            .bind(&botanist.forename)
            .bind(&botanist.surname)
            .bind(&botanist.phone)
            .fetch_optional(&mut *savepoint)
            .await;
        let upserted = match upserted {
            Ok(row) => row,
            Err(e) => {
                savepoint.rollback().await?;
                return Err(e.into());
            }
        };
        let resolved = Self::settle(
            &mut savepoint,
            upserted,
            "SELECT botanist_id FROM botanist WHERE email = $1",
            &botanist.email,
        )
        .await;
        match resolved {
            Ok(r) => {
                savepoint.commit().await?;
                Ok(r)
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e)
            }
        }
    }

    async fn link_plant(&mut self, plant: &PlantLink) -> Result<LinkStatus, StoreError> {
        // ---
        let result = sqlx::query(
            r#"
            INSERT INTO plant (plant_id, species_id, country_id, botanist_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (plant_id) DO NOTHING
            "#,
        )
        .bind(plant.plant_id)
        .bind(plant.species_id)
        .bind(plant.country_id)
        .bind(plant.botanist_id)
        .execute(self.conn()?)
        .await?;

        Ok(if result.rows_affected() == 1 {
            LinkStatus::Inserted
        } else {
            LinkStatus::Existing
        })
    }

    async fn insert_readings(&mut self, readings: &[NewSensorReading]) -> Result<u64, StoreError> {
        // ---
        if readings.is_empty() {
            return Ok(0);
        }
        let conn = self.conn()?;
        let mut savepoint = conn.begin().await?;
        let mut inserted = 0u64;

        for chunk in readings.chunks(FACT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO sensor_data \
                 (plant_id, recording_taken, last_watered, soil_moisture, temperature) ",
            );
            builder.push_values(chunk, |mut row, r| {
                row.push_bind(r.plant_id)
                    .push_bind(r.recording_taken)
                    .push_bind(r.last_watered)
                    .push_bind(r.soil_moisture)
                    .push_bind(r.temperature);
            });

            match builder.build().execute(&mut *savepoint).await {
                Ok(result) => inserted += result.rows_affected(),
                Err(e) => {
                    savepoint.rollback().await?;
                    return Err(e.into());
                }
            }
        }

        savepoint.commit().await?;
        Ok(inserted)
    }

    async fn archive_rows(&mut self) -> Result<Vec<ArchiveRow>, StoreError> {
        // ---
        let conn = self.conn()?;
        sqlx::query("LOCK TABLE sensor_data IN EXCLUSIVE MODE")
            .execute(&mut *conn)
            .await?;
        let rows = sqlx::query_as::<_, ArchiveRow>(ARCHIVE_JOIN_SQL)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn truncate_readings(&mut self) -> Result<(), StoreError> {
        // ---
        sqlx::query("TRUNCATE TABLE sensor_data")
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        // ---
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.commit().await?;
        tracing::debug!("Committed warehouse transaction");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        // ---
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.rollback().await?;
        tracing::debug!("Rolled back warehouse transaction");
        Ok(())
    }
}
