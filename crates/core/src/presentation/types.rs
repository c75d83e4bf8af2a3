//! Types describing the upstream presentation document.

use serde::{Deserialize, Serialize};

/// Offset span of a slide's narration within the language's continuous
/// audio track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NarrationSpan {
    /// Start offset in seconds.
    pub start_secs: f64,
    /// End offset in seconds.
    pub end_secs: f64,
}

impl NarrationSpan {
    /// Narrated duration of the slide; zero when the span is degenerate.
    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }
}

/// Reference to a narration audio artifact produced by the upstream
/// narration system. Read-only from our side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioChunkRef {
    /// Position of the chunk within the track.
    pub index: usize,
    /// Location of the chunk (http(s) URL or file path).
    pub url: String,
}

/// One slide of a presentation, with narration metadata for the requested
/// language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlideManifest {
    /// Slide position, 0-based.
    pub index: usize,
    /// Narration span for the requested language, if narrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<NarrationSpan>,
    /// Narration audio chunks for this slide, in playback order.
    #[serde(default)]
    pub audio_chunks: Vec<AudioChunkRef>,
}

/// Everything the pipeline needs to know about a presentation in one
/// language: the renderable document plus per-slide narration metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresentationManifest {
    /// Presentation id.
    pub presentation_id: String,
    /// Requested narration language.
    pub language: String,
    /// URL of the rendered presentation document; slides are addressed
    /// by fragment (`#slide=N`).
    pub render_url: String,
    /// Slides in display order.
    pub slides: Vec<SlideManifest>,
}

impl PresentationManifest {
    /// All audio chunk references across slides, in slide order.
    pub fn audio_chunks(&self) -> Vec<AudioChunkRef> {
        self.slides
            .iter()
            .flat_map(|s| s.audio_chunks.iter().cloned())
            .collect()
    }
}
