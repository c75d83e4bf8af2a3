//! Mock presentation client.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::presentation::{PresentationClient, PresentationError, PresentationManifest};

/// Presentation client returning a fixed manifest.
pub struct MockPresentationClient {
    manifest: Mutex<Result<PresentationManifest, String>>,
    fetch_count: AtomicUsize,
}

impl MockPresentationClient {
    pub fn new(manifest: PresentationManifest) -> Self {
        Self {
            manifest: Mutex::new(Ok(manifest)),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Client whose every fetch fails with the given message.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            manifest: Mutex::new(Err(reason.into())),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Number of fetches performed.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresentationClient for MockPresentationClient {
    async fn fetch(
        &self,
        _presentation_id: &str,
        _language: &str,
    ) -> Result<PresentationManifest, PresentationError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        match &*self.manifest.lock().unwrap() {
            Ok(manifest) => Ok(manifest.clone()),
            Err(reason) => Err(PresentationError::Api(reason.clone())),
        }
    }
}
