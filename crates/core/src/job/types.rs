//! Core export job data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Export Settings Types
// ============================================================================

/// Output resolution class for the exported video.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// 1280x720
    #[default]
    Standard,
    /// 1920x1080
    High,
    /// 3840x2160
    Ultra,
}

impl Resolution {
    /// Returns the pixel dimensions as (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Standard => (1280, 720),
            Resolution::High => (1920, 1080),
            Resolution::Ultra => (3840, 2160),
        }
    }
}

/// Output frame rate. Only a fixed set of rates is accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum FrameRate {
    Fps24,
    #[default]
    Fps30,
    Fps60,
}

impl FrameRate {
    /// Frames per second as an integer.
    pub fn as_u32(&self) -> u32 {
        match self {
            FrameRate::Fps24 => 24,
            FrameRate::Fps30 => 30,
            FrameRate::Fps60 => 60,
        }
    }
}

impl TryFrom<u32> for FrameRate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            24 => Ok(FrameRate::Fps24),
            30 => Ok(FrameRate::Fps30),
            60 => Ok(FrameRate::Fps60),
            other => Err(format!("unsupported frame rate: {} (expected 24, 30 or 60)", other)),
        }
    }
}

impl From<FrameRate> for u32 {
    fn from(value: FrameRate) -> Self {
        value.as_u32()
    }
}

/// Quality preset mapping to a fixed encoder compression/bitrate pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    /// x264 speed/compression preset for this quality level.
    pub fn encoder_preset(&self) -> &'static str {
        match self {
            QualityPreset::Low => "veryfast",
            QualityPreset::Medium => "medium",
            QualityPreset::High => "slow",
        }
    }

    /// Target video bitrate in kbps.
    pub fn video_bitrate_kbps(&self) -> u32 {
        match self {
            QualityPreset::Low => 1500,
            QualityPreset::Medium => 4000,
            QualityPreset::High => 8000,
        }
    }

    /// Target audio bitrate in kbps, applied when muxing.
    pub fn audio_bitrate_kbps(&self) -> u32 {
        match self {
            QualityPreset::Low => 96,
            QualityPreset::Medium => 128,
            QualityPreset::High => 192,
        }
    }
}

/// Settings for a single export job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExportSettings {
    /// Resolution class of the output video.
    #[serde(default)]
    pub resolution: Resolution,
    /// Output frame rate.
    #[serde(default)]
    pub frame_rate: FrameRate,
    /// Encoder quality preset.
    #[serde(default)]
    pub quality: QualityPreset,
}

// ============================================================================
// Lifecycle Types
// ============================================================================

/// Sub-phase of a processing job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    /// Fetching the presentation manifest and narration timings.
    Loading,
    /// Capturing one frame per slide.
    Rendering,
    /// Assembling the slideshow and the audio track.
    Encoding,
    /// Muxing video and audio into the output container.
    Merging,
    /// Uploading the output and issuing the download URL.
    Uploading,
}

impl std::fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportPhase::Loading => write!(f, "loading"),
            ExportPhase::Rendering => write!(f, "rendering"),
            ExportPhase::Encoding => write!(f, "encoding"),
            ExportPhase::Merging => write!(f, "merging"),
            ExportPhase::Uploading => write!(f, "uploading"),
        }
    }
}

/// Stable failure classification exposed to clients.
///
/// Clients use this to distinguish "try again" failures from
/// "fix your input" failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The capture surface crashed or a slide failed to settle.
    RenderFailure,
    /// Audio and video durations diverge beyond tolerance.
    TimingMismatch,
    /// The encoding toolchain reported an error.
    EncodeFailure,
    /// Object storage upload failed.
    UploadFailure,
    /// Job exceeded its wall-clock budget.
    Timeout,
    /// User-initiated cancellation.
    Cancelled,
}

impl ErrorClass {
    /// Stable string form used in the API and in metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::RenderFailure => "render_failure",
            ErrorClass::TimingMismatch => "timing_mismatch",
            ErrorClass::EncodeFailure => "encode_failure",
            ErrorClass::UploadFailure => "upload_failure",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Cancelled => "cancelled",
        }
    }

    /// Whether a failure of this class warrants an automatic retry.
    ///
    /// Render and timing failures indicate bad input, not flaky
    /// infrastructure, so they fail the job immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::UploadFailure | ErrorClass::EncodeFailure | ErrorClass::Timeout
        )
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result fields populated when a job completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportResult {
    /// Time-limited signed download URL.
    pub download_url: String,
    /// Object storage key of the output file.
    pub storage_key: String,
    /// Output file size in bytes.
    pub file_size_bytes: u64,
    /// Total output duration in seconds.
    pub duration_secs: f64,
}

/// Current state of an export job.
///
/// State machine flow:
/// ```text
/// Pending -> Processing -> Completed
///               |    \
///               v     v
///            Failed  Cancelled
/// ```
/// Terminal states are never left; a retry creates a new job id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobState {
    /// Job created, waiting for a worker slot.
    Pending,

    /// A worker owns the job and is driving it through the pipeline.
    Processing {
        /// Current pipeline sub-phase.
        phase: ExportPhase,
        /// Progress 0-100, monotonically non-decreasing.
        progress: u8,
        started_at: DateTime<Utc>,
        /// Bumped on every progress update; the reaper requeues jobs
        /// whose heartbeat goes stale.
        heartbeat_at: DateTime<Utc>,
    },

    /// Export finished successfully (terminal).
    Completed {
        result: ExportResult,
        completed_at: DateTime<Utc>,
    },

    /// Export failed (terminal; retries create a new job).
    Failed {
        /// Human-readable error message.
        error: String,
        /// Stable classification for client UIs.
        class: ErrorClass,
        /// Last progress recorded before the failure; snapshots never
        /// report less than a client already observed.
        #[serde(default)]
        progress: u8,
        failed_at: DateTime<Utc>,
    },

    /// Cancelled by the user before completion (terminal).
    Cancelled {
        /// Last progress recorded before the cancellation.
        #[serde(default)]
        progress: u8,
        cancelled_at: DateTime<Utc>,
    },
}

impl JobState {
    /// Returns the state type as a string (matches the serde tag).
    pub fn state_type(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing { .. } => "processing",
            JobState::Completed { .. } => "completed",
            JobState::Failed { .. } => "failed",
            JobState::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::Failed { .. } | JobState::Cancelled { .. }
        )
    }

    /// Progress for API snapshots: 0 while pending, the tracked value
    /// while processing, 100 iff completed. Failed and cancelled jobs
    /// keep the last value they reached.
    pub fn progress(&self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Processing { progress, .. } => *progress,
            JobState::Completed { .. } => 100,
            JobState::Failed { progress, .. } | JobState::Cancelled { progress, .. } => *progress,
        }
    }
}

/// A full export job record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportJob {
    /// Opaque unique job id.
    pub id: String,
    /// Source presentation id.
    pub presentation_id: String,
    /// Requesting user id.
    pub requested_by: String,
    /// Target narration language code.
    pub language: String,
    /// Export settings.
    pub settings: ExportSettings,
    /// Current lifecycle state.
    pub state: JobState,
    /// Attempt number, 1-based. A retry creates a new job with attempt + 1.
    pub attempt: u32,
    /// Id of the job this one retries, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    /// Whether cooperative cancellation has been requested.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Earliest time a worker may claim this job (retry backoff).
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_dimensions() {
        assert_eq!(Resolution::Standard.dimensions(), (1280, 720));
        assert_eq!(Resolution::High.dimensions(), (1920, 1080));
        assert_eq!(Resolution::Ultra.dimensions(), (3840, 2160));
    }

    #[test]
    fn test_frame_rate_rejects_unsupported() {
        assert!(FrameRate::try_from(30).is_ok());
        assert!(FrameRate::try_from(25).is_err());
        assert_eq!(FrameRate::Fps60.as_u32(), 60);
    }

    #[test]
    fn test_frame_rate_serde_roundtrip() {
        let settings: ExportSettings =
            serde_json::from_str(r#"{"resolution":"high","frame_rate":24,"quality":"low"}"#)
                .unwrap();
        assert_eq!(settings.frame_rate, FrameRate::Fps24);
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"frame_rate\":24"));
    }

    #[test]
    fn test_quality_preset_pairs() {
        assert_eq!(QualityPreset::Low.encoder_preset(), "veryfast");
        assert_eq!(QualityPreset::Medium.video_bitrate_kbps(), 4000);
        assert_eq!(QualityPreset::High.audio_bitrate_kbps(), 192);
    }

    #[test]
    fn test_error_class_retryable() {
        assert!(ErrorClass::UploadFailure.is_retryable());
        assert!(ErrorClass::EncodeFailure.is_retryable());
        assert!(ErrorClass::Timeout.is_retryable());
        assert!(!ErrorClass::RenderFailure.is_retryable());
        assert!(!ErrorClass::TimingMismatch.is_retryable());
        assert!(!ErrorClass::Cancelled.is_retryable());
    }

    #[test]
    fn test_state_serialization_tag() {
        let state = JobState::Processing {
            phase: ExportPhase::Rendering,
            progress: 30,
            started_at: Utc::now(),
            heartbeat_at: Utc::now(),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"type\":\"processing\""));
        assert!(json.contains("\"phase\":\"rendering\""));
    }

    #[test]
    fn test_state_progress() {
        assert_eq!(JobState::Pending.progress(), 0);
        let done = JobState::Completed {
            result: ExportResult {
                download_url: "https://example/dl".to_string(),
                storage_key: "u/p/j.mp4".to_string(),
                file_size_bytes: 1024,
                duration_secs: 6.5,
            },
            completed_at: Utc::now(),
        };
        assert_eq!(done.progress(), 100);
        assert!(done.is_terminal());

        // Terminal failures keep the last progress a client observed.
        let failed = JobState::Failed {
            error: "ffmpeg exploded".to_string(),
            class: ErrorClass::EncodeFailure,
            progress: 70,
            failed_at: Utc::now(),
        };
        assert_eq!(failed.progress(), 70);
    }
}
