//! Presentation document read client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::types::PresentationManifest;

/// Errors from the presentation read API.
#[derive(Debug, Error)]
pub enum PresentationError {
    /// Presentation does not exist.
    #[error("presentation not found: {0}")]
    NotFound(String),

    /// Presentation exists but has no narration for the language.
    #[error("no narration for language '{language}' in presentation {presentation_id}")]
    LanguageUnavailable {
        presentation_id: String,
        language: String,
    },

    /// Transport or server error.
    #[error("presentation API error: {0}")]
    Api(String),
}

/// Read access to the presentation/document store.
#[async_trait]
pub trait PresentationClient: Send + Sync {
    /// Fetch the manifest for one presentation in one narration language.
    async fn fetch(
        &self,
        presentation_id: &str,
        language: &str,
    ) -> Result<PresentationManifest, PresentationError>;
}

/// Configuration for the HTTP presentation client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationApiConfig {
    /// Base URL of the document store API.
    pub url: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// HTTP implementation backed by the document store's read API.
pub struct HttpPresentationClient {
    config: PresentationApiConfig,
    client: reqwest::Client,
}

impl HttpPresentationClient {
    pub fn new(config: PresentationApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl PresentationClient for HttpPresentationClient {
    async fn fetch(
        &self,
        presentation_id: &str,
        language: &str,
    ) -> Result<PresentationManifest, PresentationError> {
        let url = format!(
            "{}/presentations/{}/export-manifest?language={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(presentation_id),
            urlencoding::encode(language),
        );

        let started = std::time::Instant::now();
        let response = self.client.get(&url).send().await;
        crate::metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["presentation_api", "fetch_manifest"])
            .observe(started.elapsed().as_secs_f64());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                crate::metrics::EXTERNAL_SERVICE_REQUESTS
                    .with_label_values(&["presentation_api", "fetch_manifest", "error"])
                    .inc();
                return Err(PresentationError::Api(e.to_string()));
            }
        };

        let outcome = if response.status().is_success() {
            "success"
        } else {
            "error"
        };
        crate::metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["presentation_api", "fetch_manifest", outcome])
            .inc();

        match response.status() {
            status if status.is_success() => response
                .json::<PresentationManifest>()
                .await
                .map_err(|e| PresentationError::Api(format!("invalid manifest body: {}", e))),
            reqwest::StatusCode::NOT_FOUND => {
                Err(PresentationError::NotFound(presentation_id.to_string()))
            }
            reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
                Err(PresentationError::LanguageUnavailable {
                    presentation_id: presentation_id.to_string(),
                    language: language.to_string(),
                })
            }
            status => Err(PresentationError::Api(format!(
                "unexpected status {} from {}",
                status, url
            ))),
        }
    }
}
