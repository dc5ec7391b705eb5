//! Directory-backed storage backend.
//!
//! Each key is stored as one file inside the backend's directory. File names
//! are the percent-encoded key, so `vault/session` lands in
//! `vault%2Fsession` and keys never escape the directory.
//!
//! Writes go to a temporary sibling file which is then renamed over the
//! target, so a concurrent reader sees either the old record or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::{StorageBackend, StorageError};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A storage backend that keeps one file per key in a directory.
///
/// # Examples
///
/// ```no_run
/// # use vault_storage::FileBackend;
/// # async fn example() -> Result<(), vault_storage::StorageError> {
/// let backend = FileBackend::open("/home/me/.vault").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open a file backend rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::Open {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = tokio::fs::set_permissions(dir, perms).await;
        }

        debug!(dir = %dir.display(), "opened file storage");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Return the directory this backend writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(&*urlencoding::encode(key))
    }

    fn tmp_path_for(&self, key: &str) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{n}.tmp",
            urlencoding::encode(key),
            std::process::id()
        ))
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let target = self.path_for(key);
        let tmp = self.tmp_path_for(key);
        let write_err = |e: std::io::Error| StorageError::Write {
            key: key.to_owned(),
            reason: e.to_string(),
        };

        tokio::fs::write(&tmp, value).await.map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = tokio::fs::set_permissions(&tmp, perms).await;
        }

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .map_err(|e| StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }
}
