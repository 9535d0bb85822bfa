//! Plant sensor ingestion service.
//!
//! Raw plant readings are cleaned, mapped onto a small star schema
//! (species, country, botanist, plant, sensor_data) and loaded in one
//! transaction per run. A separately scheduled archiver drains the fact table
//! into per-day CSV objects in cold storage.
//!
//! This crate follows the Explicit Module Boundary Pattern (EMBP): each module
//! exposes its surface through its gateway and the items needed by `main.rs`
//! and `routes` are re-exported here.

pub mod alerts;
pub mod archive;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod schema;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{PipelineError, ResolutionError, RunFailure, ValidationError};
pub use models::{CleanedReading, RawReading};
pub use pipeline::{PipelineSettings, RunReport};
