//! Local-filesystem blob store.

use std::path::PathBuf;
use std::time::Duration;

use crate::{validate_path, BlobStore, StorageError};

/// Stores blobs under a root directory and serves them from a public base
/// URL (a static file server is assumed to front the root).
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    /// * `root` - directory blobs are written under; created on demand.
    /// * `public_base_url` - URL prefix mapping to `root`, no trailing slash.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let mut public_base_url = public_base_url.into();
        while public_base_url.ends_with('/') {
            public_base_url.pop();
        }
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    fn absolute(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let absolute = self.absolute(path)?;
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&absolute, bytes).await?;
        tracing::debug!(path, size = bytes.len(), "Blob stored");
        Ok(self.url_for(path))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let absolute = self.absolute(path)?;
        match tokio::fs::read(&absolute).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let absolute = self.absolute(path)?;
        Ok(tokio::fs::try_exists(&absolute).await?)
    }

    async fn temporary_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        if !self.exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let expires = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        Ok(format!(
            "{}/{}?expires={}",
            self.public_base_url,
            path,
            expires.timestamp()
        ))
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}
