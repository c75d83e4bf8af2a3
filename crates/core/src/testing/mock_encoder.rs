//! Mock encoder.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::encoder::{EncodedTrack, Encoder, EncoderError, MediaInfo, SlideFrame};
use crate::job::ExportSettings;

/// Encoder that writes placeholder outputs and records its inputs.
///
/// The probed duration of the spliced audio track is configurable so
/// tests can exercise the timing check.
pub struct MockEncoder {
    audio_duration_secs: Mutex<f64>,
    slideshow_durations: Mutex<Vec<f64>>,
    mux_count: AtomicUsize,
    concat_count: AtomicUsize,
    fail_slideshow: Mutex<Option<String>>,
    slideshow_delay_ms: AtomicU64,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self {
            audio_duration_secs: Mutex::new(0.0),
            slideshow_durations: Mutex::new(Vec::new()),
            mux_count: AtomicUsize::new(0),
            concat_count: AtomicUsize::new(0),
            fail_slideshow: Mutex::new(None),
            slideshow_delay_ms: AtomicU64::new(0),
        }
    }

    /// Sets the duration the spliced narration track will probe at.
    pub fn with_audio_duration(self, secs: f64) -> Self {
        *self.audio_duration_secs.lock().unwrap() = secs;
        self
    }

    /// Makes every slideshow build fail with the given message.
    pub fn fail_slideshow(&self, reason: impl Into<String>) {
        *self.fail_slideshow.lock().unwrap() = Some(reason.into());
    }

    /// Makes every slideshow build take this long, simulating a slow
    /// ffmpeg invocation.
    pub fn delay_slideshow(&self, delay: std::time::Duration) {
        self.slideshow_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Display durations handed to the last slideshow build.
    pub fn slideshow_durations(&self) -> Vec<f64> {
        self.slideshow_durations.lock().unwrap().clone()
    }

    pub fn mux_count(&self) -> usize {
        self.mux_count.load(Ordering::SeqCst)
    }

    pub fn concat_count(&self) -> usize {
        self.concat_count.load(Ordering::SeqCst)
    }

    async fn write_output(path: &Path, duration_secs: f64) -> Result<EncodedTrack, EncoderError> {
        tokio::fs::write(path, b"media").await?;
        Ok(EncodedTrack {
            path: path.to_path_buf(),
            size_bytes: 5,
            duration_secs,
        })
    }
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes: 5,
            duration_secs: *self.audio_duration_secs.lock().unwrap(),
            format: "mov".to_string(),
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            video_width: Some(1280),
            video_height: Some(720),
        })
    }

    async fn build_slideshow(
        &self,
        frames: &[SlideFrame],
        _settings: &ExportSettings,
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError> {
        let delay_ms = self.slideshow_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        if let Some(reason) = self.fail_slideshow.lock().unwrap().clone() {
            return Err(EncoderError::encode_failed(reason, None));
        }
        if frames.is_empty() {
            return Err(EncoderError::EmptyInput {
                reason: "no slide frames".to_string(),
            });
        }
        let durations: Vec<f64> = frames.iter().map(|f| f.display_secs).collect();
        let total = durations.iter().sum();
        *self.slideshow_durations.lock().unwrap() = durations;
        Self::write_output(output, total).await
    }

    async fn concat_audio(
        &self,
        parts: &[PathBuf],
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError> {
        if parts.is_empty() {
            return Err(EncoderError::EmptyInput {
                reason: "no audio parts".to_string(),
            });
        }
        for part in parts {
            if !part.exists() {
                return Err(EncoderError::InputNotFound { path: part.clone() });
            }
        }
        self.concat_count.fetch_add(1, Ordering::SeqCst);
        let secs = *self.audio_duration_secs.lock().unwrap();
        Self::write_output(output, secs).await
    }

    async fn mux(
        &self,
        _video: &Path,
        _audio: &Path,
        _settings: &ExportSettings,
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError> {
        self.mux_count.fetch_add(1, Ordering::SeqCst);
        let secs = *self.audio_duration_secs.lock().unwrap();
        Self::write_output(output, secs).await
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Workers run encoder futures on a multi-threaded runtime, so every
    // trait method must produce a Send future. Holding the duration
    // mutex guard across an await point breaks that bound.
    #[test]
    fn test_encoder_futures_are_send() {
        fn assert_send<T: Send>(_: T) {}

        let encoder = MockEncoder::new();
        let parts = vec![PathBuf::from("/work/a0.mp3")];
        assert_send(encoder.probe(Path::new("/work/out.mp4")));
        assert_send(encoder.concat_audio(&parts, Path::new("/work/audio.m4a")));
        assert_send(encoder.mux(
            Path::new("/work/video.mp4"),
            Path::new("/work/audio.m4a"),
            &ExportSettings::default(),
            Path::new("/work/out.mp4"),
        ));
    }
}
