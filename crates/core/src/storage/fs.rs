//! Filesystem-backed object store with signed download URLs.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::config::StorageConfig;
use super::error::StorageError;
use super::traits::{ObjectStore, StoredObject};

/// Object store backed by a local directory tree.
///
/// Download links carry an expiry timestamp and a SHA-256 signature over
/// the key, the expiry and the configured secret, so a leaked URL stops
/// working once its TTL passes and cannot be retargeted at another key.
pub struct FsObjectStore {
    config: StorageConfig,
}

impl FsObjectStore {
    /// Creates a new filesystem store with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Absolute path of the object stored under `key`.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        Self::check_key(key)?;
        Ok(self.config.root_dir.join(key))
    }

    /// Verifies the signature and expiry of a download request.
    pub fn verify_signed(&self, key: &str, expires: i64, sig: &str) -> Result<(), StorageError> {
        Self::check_key(key)?;
        if Utc::now().timestamp() > expires {
            return Err(StorageError::InvalidSignature);
        }
        let expected = self.signature(key, expires);
        if expected.as_bytes().len() != sig.len() {
            return Err(StorageError::InvalidSignature);
        }
        // Compare without early exit.
        let mut diff = 0u8;
        for (a, b) in expected.bytes().zip(sig.bytes()) {
            diff |= a ^ b;
        }
        if diff != 0 {
            return Err(StorageError::InvalidSignature);
        }
        Ok(())
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.config.url_signing_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn check_key(key: &str) -> Result<(), StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('/')
            && key
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        if valid {
            Ok(())
        } else {
            Err(StorageError::InvalidKey {
                key: key.to_string(),
            })
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(&self, key: &str, local_path: &Path) -> Result<StoredObject, StorageError> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| StorageError::upload_failed(format!("copy to {:?}: {}", dest, e)))?;

        let meta = tokio::fs::metadata(&dest).await?;
        Ok(StoredObject {
            key: key.to_string(),
            size_bytes: meta.len(),
        })
    }

    async fn signed_url(&self, key: &str) -> Result<String, StorageError> {
        Self::check_key(key)?;
        let expires = Utc::now().timestamp() + self.config.download_ttl_secs as i64;
        let sig = self.signature(key, expires);
        Ok(format!(
            "{}/api/v1/downloads/{}?expires={}&sig={}",
            self.config.public_base_url.trim_end_matches('/'),
            key,
            expires,
            sig,
        ))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn validate(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.config.root_dir).await?;
        Ok(())
    }
}
