use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Job lifecycle
    JobSubmitted {
        job_id: String,
        presentation_id: String,
        requested_by: String,
        language: String,
        /// Attempt number, 1-based
        attempt: u32,
        /// Job this one retries, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_of: Option<String>,
    },
    JobClaimed {
        job_id: String,
        /// Worker slot that claimed the job
        worker: usize,
    },
    /// Pipeline phase transition (one event per phase, not per progress tick).
    PhaseChanged {
        job_id: String,
        phase: String,
        progress: u8,
    },
    JobCompleted {
        job_id: String,
        storage_key: String,
        file_size_bytes: u64,
        /// Output duration in seconds
        duration_secs: f64,
        /// Wall-clock processing time in milliseconds
        elapsed_ms: u64,
    },
    JobFailed {
        job_id: String,
        error: String,
        /// Stable failure classification
        class: String,
        /// Whether a retry was scheduled
        retried: bool,
    },
    JobCancelled {
        job_id: String,
        cancelled_by: String,
        previous_state: String,
    },
    /// Job record was permanently deleted (hard delete).
    JobDeleted {
        job_id: String,
        deleted_by: String,
        previous_state: String,
    },
    /// A successor job was created for a retryable failure.
    RetryScheduled {
        /// Failed job
        job_id: String,
        /// Newly created successor job
        retry_job_id: String,
        /// Attempt number of the successor, 1-based
        attempt: u32,
        /// Backoff before the successor becomes claimable
        delay_secs: u64,
    },
    /// A stale processing job was reaped by the watchdog.
    JobReaped {
        job_id: String,
        /// Seconds since the last heartbeat
        stale_secs: i64,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::JobSubmitted { .. } => "job_submitted",
            Self::JobClaimed { .. } => "job_claimed",
            Self::PhaseChanged { .. } => "phase_changed",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::JobCancelled { .. } => "job_cancelled",
            Self::JobDeleted { .. } => "job_deleted",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::JobReaped { .. } => "job_reaped",
        }
    }

    /// Returns the associated job ID, if any
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
            Self::JobSubmitted { job_id, .. }
            | Self::JobClaimed { job_id, .. }
            | Self::PhaseChanged { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobCancelled { job_id, .. }
            | Self::JobDeleted { job_id, .. }
            | Self::RetryScheduled { job_id, .. }
            | Self::JobReaped { job_id, .. } => Some(job_id),
        }
    }

    /// Returns the associated user ID, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::JobSubmitted { requested_by, .. } => Some(requested_by),
            Self::JobCancelled { cancelled_by, .. } => Some(cancelled_by),
            Self::JobDeleted { deleted_by, .. } => Some(deleted_by),
            _ => None,
        }
    }
}

/// A stored audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Database-assigned ID
    pub id: i64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Event type string (for filtering without JSON parsing)
    pub event_type: String,
    /// Associated job ID (for filtering)
    pub job_id: Option<String>,
    /// Associated user ID (for filtering)
    pub user_id: Option<String>,
    /// The full event data
    pub data: AuditEvent,
}
