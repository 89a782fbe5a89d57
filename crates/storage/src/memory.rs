//! In-memory blob store for tests.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::{validate_path, BlobStore, StorageError};

/// Keeps blobs in a `HashMap` behind an async lock. Not for production.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether the store holds no blobs.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, StorageError> {
        validate_path(path)?;
        self.blobs
            .write()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(self.url_for(path))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.read().await.contains_key(path))
    }

    async fn temporary_url(&self, path: &str, _ttl: Duration) -> Result<String, StorageError> {
        if !self.exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(self.url_for(path))
    }

    fn url_for(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip() {
        let store = MemoryBlobStore::new();
        let url = store.put("k/v.bin", b"data").await.unwrap();
        assert_eq!(url, "memory://k/v.bin");
        assert_eq!(store.get("k/v.bin").await.unwrap(), b"data");
        assert_eq!(store.len().await, 1);
    }
}
