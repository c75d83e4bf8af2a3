//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of all external service traits,
//! allowing the whole export flow to be tested without a browser, ffmpeg
//! or object storage.
//!
//! # Example
//!
//! ```rust,ignore
//! use slidecast_core::testing::{fixtures, MockEncoder, MockRenderer};
//!
//! let renderer = MockRenderer::new();
//! let encoder = MockEncoder::new().with_audio_duration(6.5);
//! let manifest = fixtures::manifest(&[(0.0, 2.0), (2.0, 5.5), (5.5, 6.5)]);
//!
//! // Use in an ExportPipeline...
//! ```

mod mock_billing_client;
mod mock_encoder;
mod mock_object_store;
mod mock_presentation_client;
mod mock_renderer;

pub use mock_billing_client::MockBillingClient;
pub use mock_encoder::MockEncoder;
pub use mock_object_store::MockObjectStore;
pub use mock_presentation_client::MockPresentationClient;
pub use mock_renderer::MockRenderer;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::presentation::{
        AudioChunkRef, NarrationSpan, PresentationManifest, SlideManifest,
    };

    /// Create a manifest with one slide per narration span and no audio
    /// chunks.
    pub fn manifest(spans: &[(f64, f64)]) -> PresentationManifest {
        PresentationManifest {
            presentation_id: "pres-1".to_string(),
            language: "en".to_string(),
            render_url: "http://docs.local/pres-1".to_string(),
            slides: spans
                .iter()
                .enumerate()
                .map(|(index, &(start_secs, end_secs))| SlideManifest {
                    index,
                    narration: Some(NarrationSpan {
                        start_secs,
                        end_secs,
                    }),
                    audio_chunks: vec![],
                })
                .collect(),
        }
    }

    /// Create a manifest with one narration chunk file per slide,
    /// writing the chunk files under `chunks_dir`.
    pub fn manifest_with_chunks(spans: &[(f64, f64)], chunks_dir: &Path) -> PresentationManifest {
        std::fs::create_dir_all(chunks_dir).expect("create chunks dir");
        let mut m = manifest(spans);
        for (i, slide) in m.slides.iter_mut().enumerate() {
            let path = chunks_dir.join(format!("chunk-{:04}.mp3", i));
            std::fs::write(&path, b"mp3").expect("write chunk");
            slide.audio_chunks.push(AudioChunkRef {
                index: i,
                url: path.to_string_lossy().to_string(),
            });
        }
        m
    }
}
