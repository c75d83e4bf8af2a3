//! Trait definitions for the renderer module.

use async_trait::async_trait;
use std::path::Path;

use super::error::RenderError;
use crate::job::Resolution;

/// A capture surface that can render one slide of a presentation to a
/// still image.
///
/// The interface is deliberately narrow so the pipeline and its tests
/// never depend on a concrete browser.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Returns the name of this renderer implementation.
    fn name(&self) -> &str;

    /// Render the presentation at `render_url` to slide `slide_index`,
    /// wait for it to settle, and write exactly one still image at the
    /// target resolution to `output`.
    async fn capture_slide(
        &self,
        render_url: &str,
        slide_index: usize,
        resolution: Resolution,
        output: &Path,
    ) -> Result<(), RenderError>;

    /// Validates that the renderer is properly configured and ready.
    async fn validate(&self) -> Result<(), RenderError>;
}
