//! Trait definitions for the encoder module.

use async_trait::async_trait;
use std::path::Path;

use super::error::EncoderError;
use super::types::{EncodedTrack, MediaInfo, SlideFrame};
use crate::job::ExportSettings;

/// An encoding toolchain that can assemble slideshows, splice audio and
/// mux the two into one container.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Probes a media file to get its information.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError>;

    /// Turns the ordered (image, duration) list into a single video
    /// stream with crossfade transitions between consecutive slides.
    /// The stream has no audio track.
    async fn build_slideshow(
        &self,
        frames: &[SlideFrame],
        settings: &ExportSettings,
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError>;

    /// Concatenates audio parts byte-exact, in order, into one
    /// continuous track without re-encoding.
    async fn concat_audio(
        &self,
        parts: &[std::path::PathBuf],
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError>;

    /// Merges a video stream and an audio track into one output
    /// container. The video stream is copied, never transcoded; audio
    /// is re-encoded to the preset's target bitrate.
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        settings: &ExportSettings,
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError>;

    /// Validates that the encoder is properly configured and ready.
    async fn validate(&self) -> Result<(), EncoderError>;
}
