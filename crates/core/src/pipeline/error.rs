//! Error types for the export pipeline.

use thiserror::Error;

use crate::encoder::EncoderError;
use crate::job::ErrorClass;
use crate::renderer::RenderError;
use crate::storage::StorageError;

/// Errors that can occur while driving a job through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fetching the manifest or narration audio failed.
    #[error("Failed to load presentation content: {reason}")]
    Load { reason: String },

    /// A slide frame capture failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Audio and video durations diverge beyond tolerance.
    #[error(
        "Narration track is {actual_secs:.2}s but slides total {expected_secs:.2}s; \
         narration timings are out of date"
    )]
    TimingMismatch {
        expected_secs: f64,
        actual_secs: f64,
    },

    /// Slideshow assembly, audio splicing or muxing failed.
    #[error(transparent)]
    Encode(#[from] EncoderError),

    /// Uploading the finished export failed.
    #[error(transparent)]
    Upload(#[from] StorageError),

    /// The job blew through its wall-clock budget.
    #[error("Export exceeded its {timeout_secs}s wall-clock budget")]
    Timeout { timeout_secs: u64 },

    /// The job was cancelled at a checkpoint.
    #[error("Export cancelled")]
    Cancelled,

    /// Job store failure while recording progress.
    #[error("Job store error: {0}")]
    Store(String),

    /// I/O error in the working directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates a new load error.
    pub fn load(reason: impl Into<String>) -> Self {
        Self::Load {
            reason: reason.into(),
        }
    }

    /// Stable failure classification for this error.
    pub fn error_class(&self) -> ErrorClass {
        match self {
            PipelineError::Load { .. } | PipelineError::Render(_) => ErrorClass::RenderFailure,
            PipelineError::TimingMismatch { .. } => ErrorClass::TimingMismatch,
            PipelineError::Encode(_) | PipelineError::Store(_) | PipelineError::Io(_) => {
                ErrorClass::EncodeFailure
            }
            PipelineError::Upload(_) => ErrorClass::UploadFailure,
            PipelineError::Timeout { .. } => ErrorClass::Timeout,
            PipelineError::Cancelled => ErrorClass::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_mapping() {
        assert_eq!(
            PipelineError::load("boom").error_class(),
            ErrorClass::RenderFailure
        );
        assert_eq!(
            PipelineError::TimingMismatch {
                expected_secs: 6.5,
                actual_secs: 8.0
            }
            .error_class(),
            ErrorClass::TimingMismatch
        );
        assert_eq!(
            PipelineError::Timeout { timeout_secs: 600 }.error_class(),
            ErrorClass::Timeout
        );
        assert_eq!(
            PipelineError::Cancelled.error_class(),
            ErrorClass::Cancelled
        );
    }
}
