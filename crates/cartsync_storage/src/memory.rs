//! In-memory blob store for testing.

use crate::error::StorageResult;
use crate::store::{validate_key, BlobStore};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory blob store.
///
/// This store keeps every blob in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Sessions that don't need persistence across restarts
///
/// # Example
///
/// ```rust
/// use cartsync_storage::{BlobStore, InMemoryBlobStore};
///
/// let store = InMemoryBlobStore::new();
/// store.write("cart", b"data").unwrap();
/// store.delete("cart").unwrap();
/// assert!(store.read("cart").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with one pre-existing blob.
    ///
    /// Useful for testing load paths against hand-made blobs.
    #[must_use]
    pub fn with_blob(key: impl Into<String>, data: Vec<u8>) -> Self {
        let store = Self::new();
        store.blobs.write().insert(key.into(), data);
        store
    }

    /// Returns the number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if no blobs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.blobs.read().get(key).cloned())
    }

    fn write(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.blobs.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.blobs.write().remove(key);
        Ok(())
    }
}
