//! Types for the encoder module.

use std::path::PathBuf;

/// One captured slide frame paired with its resolved display duration.
///
/// Ephemeral: lives only in the job's working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideFrame {
    /// Slide position, 0-based.
    pub index: usize,
    /// Captured still image.
    pub image_path: PathBuf,
    /// How long the frame is displayed in the output, in seconds.
    pub display_secs: f64,
}

/// A produced media track (video-only, audio-only, or muxed output).
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTrack {
    /// Path of the produced file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Track duration in seconds, from probing the output.
    pub duration_secs: f64,
}

/// Media file information from probing.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// Path of the probed file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Container/format name.
    pub format: String,
    /// Video codec, if a video stream is present.
    pub video_codec: Option<String>,
    /// Audio codec, if an audio stream is present.
    pub audio_codec: Option<String>,
    /// Video width in pixels.
    pub video_width: Option<u32>,
    /// Video height in pixels.
    pub video_height: Option<u32>,
}
