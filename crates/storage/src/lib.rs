//! Blob storage collaborator.
//!
//! Uploaded inputs, generated outputs, and thumbnails all go through the
//! [`BlobStore`] trait; relational rows only ever hold the returned URLs.
//! Ships a local-filesystem implementation for single-node deployments and
//! an in-memory implementation for tests.

pub mod local;
pub mod memory;
pub mod thumbnail;

use std::time::Duration;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// Errors from blob storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem-level failure.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested blob does not exist.
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Media decoding/encoding failure while producing a thumbnail.
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// A blob path escaped the store root or was otherwise invalid.
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),
}

/// Durable blob storage.
///
/// `path` is a forward-slash relative key, e.g.
/// `generations/42/1234/result.mp4`.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `path`, overwriting any existing blob.
    /// Returns the durable public URL.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Fetch the bytes stored under `path`.
    async fn get(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Whether a blob exists under `path`.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// A short-lived URL for handing to external parties.
    async fn temporary_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError>;

    /// The durable public URL for `path` without touching the backend.
    fn url_for(&self, path: &str) -> String;
}

/// Validate a blob key: relative, forward slashes, no traversal.
pub(crate) fn validate_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|seg| seg.is_empty() || seg == "..")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
