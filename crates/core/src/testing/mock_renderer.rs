//! Mock renderer.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::job::Resolution;
use crate::renderer::{RenderError, Renderer};

/// Renderer that writes a placeholder file per capture.
pub struct MockRenderer {
    captures: AtomicUsize,
    fail_from: AtomicUsize,
    delay_ms: AtomicU64,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            captures: AtomicUsize::new(0),
            fail_from: AtomicUsize::new(usize::MAX),
            delay_ms: AtomicU64::new(0),
        }
    }

    /// Fail every capture from the `n`-th one (0-based) onwards.
    pub fn fail_after(&self, n: usize) {
        self.fail_from.store(n, Ordering::SeqCst);
    }

    /// Make every capture take this long, simulating a slow browser.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful captures.
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn capture_slide(
        &self,
        _render_url: &str,
        slide_index: usize,
        _resolution: Resolution,
        output: &Path,
    ) -> Result<(), RenderError> {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.captures.load(Ordering::SeqCst) >= self.fail_from.load(Ordering::SeqCst) {
            return Err(RenderError::capture_failed(
                slide_index,
                "mock capture failure",
                None,
            ));
        }
        tokio::fs::write(output, b"png").await?;
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn validate(&self) -> Result<(), RenderError> {
        Ok(())
    }
}
