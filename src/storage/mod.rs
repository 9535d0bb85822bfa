//! Cold-storage seam.
//!
//! The archiver only needs whole-object reads and writes keyed by string.
//! [`S3ColdStorage`] talks to an S3-compatible bucket; [`MemoryColdStorage`]
//! keeps objects in a map and can be told to fail uploads.

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod s3;

pub use memory::MemoryColdStorage;
pub use s3::{S3ColdStorage, S3Settings};

// ---

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store request failed: {0}")]
    Backend(String),

    #[error("object store I/O failed: {0}")]
    Io(String),
}

#[async_trait]
pub trait ColdStorage: Send + Sync {
    /// Read a whole object; `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a whole object, replacing any previous version.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
}
