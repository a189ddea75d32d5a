//! Blob storage for finished exports
//!
//! Exports are staged in the storage temp directory, then copied in under a
//! public key and later removed when they expire.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;

/// Destination for finished export files
#[async_trait]
pub trait Storage: Send + Sync {
    /// Copy a local file in under `remote_key` and return its public URL
    async fn copy_in(&self, local: &Path, remote_key: &str) -> Result<String, StorageError>;

    /// Delete the file stored under `remote_key`
    async fn remove(&self, remote_key: &str) -> Result<(), StorageError>;

    /// URL prefix for stored files
    fn base_url(&self) -> &str;

    /// Directory for staging files before upload
    fn temp_dir(&self) -> &Path;
}

/// Storage rooted in a local directory served under `base_url`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
    temp_dir: PathBuf,
}

impl LocalStorage {
    /// Create storage writing under `root`, staging in the OS temp dir
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Stage files in `temp_dir` instead of the OS temp dir
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL of `remote_key`
    pub fn url_for(&self, remote_key: &str) -> String {
        format!("{}/{}", self.base_url, remote_key.trim_start_matches('/'))
    }

    /// Local path of `remote_key`, refusing keys that escape the root
    pub fn path_for(&self, remote_key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(remote_key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if remote_key.trim_start_matches('/').is_empty() || escapes {
            return Err(StorageError::InvalidKey(remote_key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn copy_in(&self, local: &Path, remote_key: &str) -> Result<String, StorageError> {
        let target = self.path_for(remote_key)?;
        let upload_failed = |e: std::io::Error| StorageError::UploadFailed {
            key: remote_key.to_string(),
            message: e.to_string(),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(upload_failed)?;
        }
        let bytes = tokio::fs::copy(local, &target).await.map_err(upload_failed)?;

        debug!("Stored {} bytes at {}", bytes, target.display());
        Ok(self.url_for(remote_key))
    }

    async fn remove(&self, remote_key: &str) -> Result<(), StorageError> {
        let target = self.path_for(remote_key)?;
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| StorageError::RemoveFailed {
                key: remote_key.to_string(),
                message: e.to_string(),
            })?;

        debug!("Removed {}", target.display());
        Ok(())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_in_and_remove() {
        let root = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path(), "/uploads/").with_temp_dir(staging.path());

        let local = staging.path().join("a-export.csv");
        tokio::fs::write(&local, "_id\n1\n").await.unwrap();

        let url = storage.copy_in(&local, "/exports/a.csv").await.unwrap();
        assert_eq!(url, "/uploads/exports/a.csv");
        let stored = root.path().join("exports").join("a.csv");
        assert_eq!(tokio::fs::read_to_string(&stored).await.unwrap(), "_id\n1\n");

        storage.remove("/exports/a.csv").await.unwrap();
        assert!(!stored.exists());
    }

    #[tokio::test]
    async fn test_remove_missing_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path(), "/uploads");
        let err = storage.remove("/exports/none.csv").await.unwrap_err();
        assert!(matches!(err, StorageError::RemoveFailed { .. }));
    }

    #[tokio::test]
    async fn test_copy_in_missing_source_fails() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path(), "/uploads");
        let err = storage
            .copy_in(Path::new("/definitely/not/here.csv"), "/exports/x.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UploadFailed { .. }));
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let storage = LocalStorage::new("/srv/uploads", "/uploads");
        assert!(storage.path_for("../etc/passwd").is_err());
        assert!(storage.path_for("/exports/../../x").is_err());
        assert!(storage.path_for("/").is_err());
        assert_eq!(
            storage.path_for("/exports/a.csv").unwrap(),
            PathBuf::from("/srv/uploads/exports/a.csv")
        );
    }
}
