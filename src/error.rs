//! Error taxonomy for the transform-and-load core and the archiver.
//!
//! Row-level problems (`ValidationError`) and key-level problems
//! (`ResolutionError`) are absorbed and counted by the pipeline. Batch-level
//! problems (`PipelineError`) are raised to the run orchestrator, which rolls
//! back and reports.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::RunReport;
use crate::storage::StorageError;
use crate::store::StoreError;

// ---

/// Why a raw row failed a cleaning gate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    // ---
    #[error("mandatory field '{0}' is missing or empty")]
    MissingField(String),

    #[error("field '{field}' is not numeric")]
    NotNumeric { field: &'static str },

    #[error("field '{field}' value {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("field '{field}' value '{value}' is not a valid timestamp")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("country_name is empty")]
    EmptyCountry,
}

/// Dimension tables resolved by natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Species,
    Country,
    Botanist,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        let name = match self {
            Dimension::Species => "species",
            Dimension::Country => "country",
            Dimension::Botanist => "botanist",
        };
        f.write_str(name)
    }
}

/// A natural key that could not be mapped to a surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("could not resolve {dimension} '{key}': {reason}")]
pub struct ResolutionError {
    pub dimension: Dimension,
    pub key: String,
    pub reason: String,
}

/// Batch- or run-fatal failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ---
    #[error("insert failed, batch rolled back: {0}")]
    Insertion(#[source] StoreError),

    #[error("store unreachable: {0}")]
    Connection(String),

    #[error("store error: {0}")]
    Store(#[source] StoreError),

    #[error("archive download of '{key}' failed: {source}")]
    Download {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("archive upload of '{key}' failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("archive object '{key}' is not a valid archive: {reason}")]
    CorruptArchive { key: String, reason: String },
}

impl PipelineError {
    /// Classify a failed write: lost connections stay run-fatal connection
    /// errors, anything else fails the batch.
    pub fn insertion(err: StoreError) -> Self {
        // ---
        match err {
            StoreError::Connection(msg) => PipelineError::Connection(msg),
            other => PipelineError::Insertion(other),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        // ---
        match err {
            StoreError::Connection(msg) => PipelineError::Connection(msg),
            other => PipelineError::Store(other),
        }
    }
}

/// A pipeline run that did not commit, with the counts gathered so far.
#[derive(Debug, Error)]
#[error("pipeline run failed: {source}")]
pub struct RunFailure {
    pub report: RunReport,
    #[source]
    pub source: PipelineError,
}
