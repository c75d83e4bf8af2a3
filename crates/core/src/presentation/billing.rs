//! Points ledger debit client.
//!
//! An export is a metered action: the ledger is debited exactly once per
//! submission. Retry attempts created by the orchestrator do not re-debit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from the billing ledger.
#[derive(Debug, Error)]
pub enum BillingError {
    /// The user does not have enough points for an export.
    #[error("insufficient points for user {0}")]
    InsufficientPoints(String),

    /// Transport or server error.
    #[error("billing API error: {0}")]
    Api(String),
}

/// Debit access to the points/billing ledger.
#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Charge one export action against the user's balance.
    async fn debit_export(
        &self,
        user_id: &str,
        presentation_id: &str,
        job_id: &str,
    ) -> Result<(), BillingError>;
}

/// Configuration for the HTTP billing client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingApiConfig {
    /// Base URL of the ledger API.
    pub url: String,
    /// Request timeout in seconds (default: 15).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    15
}

/// HTTP implementation posting debits to the ledger.
pub struct HttpBillingClient {
    config: BillingApiConfig,
    client: reqwest::Client,
}

impl HttpBillingClient {
    pub fn new(config: BillingApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[derive(Serialize)]
struct DebitBody<'a> {
    user_id: &'a str,
    action: &'a str,
    reference: &'a str,
}

#[async_trait]
impl BillingClient for HttpBillingClient {
    async fn debit_export(
        &self,
        user_id: &str,
        presentation_id: &str,
        job_id: &str,
    ) -> Result<(), BillingError> {
        let url = format!("{}/debits", self.config.url.trim_end_matches('/'));
        let reference = format!("export:{}:{}", presentation_id, job_id);

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&DebitBody {
                user_id,
                action: "video_export",
                reference: &reference,
            })
            .send()
            .await;
        crate::metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["billing_api", "debit_export"])
            .observe(started.elapsed().as_secs_f64());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                crate::metrics::EXTERNAL_SERVICE_REQUESTS
                    .with_label_values(&["billing_api", "debit_export", "error"])
                    .inc();
                return Err(BillingError::Api(e.to_string()));
            }
        };

        let outcome = if response.status().is_success() {
            "success"
        } else {
            "error"
        };
        crate::metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["billing_api", "debit_export", outcome])
            .inc();

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::PAYMENT_REQUIRED => {
                Err(BillingError::InsufficientPoints(user_id.to_string()))
            }
            status => Err(BillingError::Api(format!(
                "unexpected status {} from ledger",
                status
            ))),
        }
    }
}
