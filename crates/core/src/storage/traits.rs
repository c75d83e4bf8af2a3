//! Trait definitions for the storage module.

use async_trait::async_trait;
use std::path::Path;

use super::error::StorageError;

/// A stored export artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Key the object is stored under.
    pub key: String,
    /// Object size in bytes.
    pub size_bytes: u64,
}

/// Durable store for finished export videos.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Uploads a local file under the given key, overwriting any
    /// previous object with the same key.
    async fn put(&self, key: &str, local_path: &Path) -> Result<StoredObject, StorageError>;

    /// Returns a time-limited signed download URL for the given key.
    async fn signed_url(&self, key: &str) -> Result<String, StorageError>;

    /// Deletes the object under the given key. Deleting a missing
    /// object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Whether an object exists under the given key.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Validates that the store is properly configured and reachable.
    async fn validate(&self) -> Result<(), StorageError>;
}

/// Builds the canonical object key for a finished export.
pub fn export_key(requested_by: &str, presentation_id: &str, job_id: &str) -> String {
    format!("{}/{}/{}.mp4", requested_by, presentation_id, job_id)
}
