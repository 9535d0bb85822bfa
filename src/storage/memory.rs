use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ColdStorage, StorageError};

// ---

#[derive(Debug, Default)]
pub struct MemoryColdStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

impl MemoryColdStorage {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Current bytes of an object, if present.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), bytes);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Io("object store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ColdStorage for MemoryColdStorage {
    // ---
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        // ---
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("upload of '{key}' rejected")));
        }
        self.lock()?.insert(key.to_string(), bytes);
        Ok(())
    }
}
