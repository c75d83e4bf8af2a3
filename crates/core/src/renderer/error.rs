//! Error types for the renderer module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while capturing slide frames.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Browser binary not found.
    #[error("Browser not found at path: {path}")]
    BrowserNotFound { path: PathBuf },

    /// The capture surface crashed or exited with an error.
    #[error("Capture failed for slide {slide_index}: {reason}")]
    CaptureFailed {
        slide_index: usize,
        reason: String,
        stderr: Option<String>,
    },

    /// The slide did not settle and produce a screenshot within the budget.
    #[error("Capture of slide {slide_index} timed out after {timeout_secs} seconds")]
    Timeout {
        slide_index: usize,
        timeout_secs: u64,
    },

    /// I/O error while capturing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Creates a new capture failed error with stderr output.
    pub fn capture_failed(
        slide_index: usize,
        reason: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self::CaptureFailed {
            slide_index,
            reason: reason.into(),
            stderr,
        }
    }
}
