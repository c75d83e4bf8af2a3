//! Mock object store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::storage::{ObjectStore, StorageError, StoredObject};

/// In-memory object store.
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, u64>>,
    put_count: AtomicUsize,
    fail_put: Mutex<Option<String>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            put_count: AtomicUsize::new(0),
            fail_put: Mutex::new(None),
        }
    }

    /// Makes every upload fail with the given message.
    pub fn fail_put(&self, reason: impl Into<String>) {
        *self.fail_put.lock().unwrap() = Some(reason.into());
    }

    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// All stored keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put(&self, key: &str, local_path: &Path) -> Result<StoredObject, StorageError> {
        if let Some(reason) = self.fail_put.lock().unwrap().clone() {
            return Err(StorageError::upload_failed(reason));
        }
        let size_bytes = tokio::fs::metadata(local_path).await?.len();
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), size_bytes);
        self.put_count.fetch_add(1, Ordering::SeqCst);
        Ok(StoredObject {
            key: key.to_string(),
            size_bytes,
        })
    }

    async fn signed_url(&self, key: &str) -> Result<String, StorageError> {
        Ok(format!(
            "http://test.local/api/v1/downloads/{}?expires=9999999999&sig=mock",
            key
        ))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn validate(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
