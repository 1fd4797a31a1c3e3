//! In-process storage.

use super::Persistence;
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Map-backed storage. Clones share the same contents, which lets a test
/// drop a store and open a new one over the "same" storage.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with a blob, e.g. one a previous session left.
    pub fn with_blob(key: &str, blob: impl Into<String>) -> Self {
        let storage = Self::new();
        storage.blobs.write().insert(key.to_string(), blob.into());
        storage
    }

    /// Current blob under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.blobs.read().get(key).cloned()
    }

    /// Number of keys ever written.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl Persistence for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, blob: &str) -> Result<()> {
        self.blobs.write().insert(key.to_string(), blob.to_string());
        Ok(())
    }
}
