//! Process-local storage backend.
//!
//! Sessions kept here are gone when the process exits. Tests use it to seed
//! and inspect the session record; embedders that persist sessions elsewhere
//! use it to keep the client stateless on disk.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError};

type Records = HashMap<Box<str>, Arc<[u8]>>;

/// Session records held in memory.
///
/// Clones share the same records, so a test can hand one clone to the client
/// and read back what it wrote through another.
///
/// # Examples
///
/// ```
/// # use vault_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("vault/session", b"{}").await.unwrap();
/// assert!(backend.exists("vault/session").await.unwrap());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    records: Arc<RwLock<Records>>,
}

impl MemoryBackend {
    /// An empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.records.read().await.get(key).map(|r| r.to_vec()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.records
            .write()
            .await
            .insert(key.into(), Arc::from(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.records.read().await.contains_key(key))
    }
}
