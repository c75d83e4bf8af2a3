//! Error types for the storage module.

use thiserror::Error;

/// Errors that can occur while storing or serving export artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object not found in the store.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The key contains path components the store refuses to touch.
    #[error("Invalid object key: {key}")]
    InvalidKey { key: String },

    /// A signed URL failed verification.
    #[error("Invalid or expired download link")]
    InvalidSignature,

    /// Upload failed.
    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    /// I/O error talking to the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Creates a new upload failed error.
    pub fn upload_failed(reason: impl Into<String>) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    /// Whether this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UploadFailed { .. } | Self::Io(_))
    }
}
