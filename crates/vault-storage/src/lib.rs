//! Client-local storage for the Vault console client.
//!
//! [`StorageBackend`] is the small record store that stands in for a
//! browser's `localStorage`. It knows nothing about sessions or tokens; the session store in
//! `vault-client` serializes its record and hands this layer opaque bytes.
//!
//! Two implementations are provided:
//!
//! - [`FileBackend`] — one file per key in a directory, used by the CLI
//! - [`MemoryBackend`] — in-memory, for tests and short-lived embedders

mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Where the client keeps records that must outlive a single request.
///
/// In practice there is one record: the serialized session under
/// `vault/session`. A session is rewritten on login and on every token
/// refresh, and removed on logout or when a refresh fails, so a backend only
/// needs whole-record reads, replaces, and deletes.
///
/// A reader must never observe half of a `put`. The session store relies on
/// this to keep "both tokens or no session" true across a crash.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Read the record stored under `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the record exists but cannot be read.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the record under `key` with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the record could not be replaced.
    /// The previous record, if any, is still in place.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove the record under `key`. Removing a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the record could not be removed.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Whether a record is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend cannot tell.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
