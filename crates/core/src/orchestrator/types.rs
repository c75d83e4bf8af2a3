//! Types for the export orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::ExportSettings;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Invalid job state for operation.
    #[error("cannot {operation} job in state {actual}")]
    InvalidState { operation: String, actual: String },

    /// The pending queue is full.
    #[error("export queue is full ({depth} pending jobs)")]
    QueueFull { depth: usize },

    /// Job store error.
    #[error("job store error: {0}")]
    JobStore(#[from] crate::job::JobError),

    /// Billing error (insufficient points or API failure).
    #[error("billing error: {0}")]
    Billing(#[from] crate::presentation::BillingError),

    /// Storage error while cleaning up artifacts.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Request to submit a new export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Source presentation id.
    pub presentation_id: String,
    /// Requesting user id.
    pub requested_by: String,
    /// Target narration language.
    pub language: String,
    /// Export settings.
    #[serde(default)]
    pub settings: ExportSettings,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the orchestrator is running.
    pub running: bool,
    /// Configured worker pool size.
    pub worker_count: usize,
    /// Jobs currently held by workers.
    pub in_flight: usize,
    /// Jobs waiting for a worker slot.
    pub pending_count: usize,
    /// Jobs in processing state (including stale ones awaiting the reaper).
    pub processing_count: usize,
    /// Completed jobs.
    pub completed_count: usize,
    /// Failed jobs.
    pub failed_count: usize,
}
