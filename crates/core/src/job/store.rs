//! Job storage trait and request/filter types.

use std::fmt;

use chrono::{DateTime, Utc};

use super::types::{ExportJob, ExportSettings, JobState};

/// Error type for job store operations.
#[derive(Debug)]
pub enum JobError {
    /// Job not found.
    NotFound(String),
    /// Cannot perform operation due to current state.
    InvalidState {
        job_id: String,
        current_state: String,
        operation: String,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotFound(id) => write!(f, "Job not found: {}", id),
            JobError::InvalidState {
                job_id,
                current_state,
                operation,
            } => write!(
                f,
                "Cannot {} job {}: current state is {}",
                operation, job_id, current_state
            ),
            JobError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// Request to create a new export job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    /// Source presentation id.
    pub presentation_id: String,
    /// Requesting user id.
    pub requested_by: String,
    /// Target narration language.
    pub language: String,
    /// Export settings.
    pub settings: ExportSettings,
    /// Attempt number (1 for fresh submissions).
    pub attempt: u32,
    /// Job id this one retries, if any.
    pub retry_of: Option<String>,
    /// Earliest claim time (now for fresh submissions, later for backoff).
    pub available_at: DateTime<Utc>,
}

impl CreateJobRequest {
    /// Build a fresh (attempt 1, immediately claimable) request.
    pub fn new(
        presentation_id: impl Into<String>,
        requested_by: impl Into<String>,
        language: impl Into<String>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            presentation_id: presentation_id.into(),
            requested_by: requested_by.into(),
            language: language.into(),
            settings,
            attempt: 1,
            retry_of: None,
            available_at: Utc::now(),
        }
    }
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Filter by state type.
    pub state: Option<String>,
    /// Filter by requesting user.
    pub requested_by: Option<String>,
    /// Filter by presentation.
    pub presentation_id: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl JobFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            state: None,
            requested_by: None,
            presentation_id: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by state type.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Filter by requesting user.
    pub fn with_requested_by(mut self, requested_by: impl Into<String>) -> Self {
        self.requested_by = Some(requested_by.into());
        self
    }

    /// Filter by presentation.
    pub fn with_presentation(mut self, presentation_id: impl Into<String>) -> Self {
        self.presentation_id = Some(presentation_id.into());
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for job storage backends.
///
/// Mutations to a single job record are only performed by the worker that
/// owns it; `claim_next_pending` is the atomic ownership handoff.
pub trait JobStore: Send + Sync {
    /// Create a new job in `Pending` state. Always assigns a fresh id.
    fn create(&self, request: CreateJobRequest) -> Result<ExportJob, JobError>;

    /// Get a job by id.
    fn get(&self, id: &str) -> Result<Option<ExportJob>, JobError>;

    /// List jobs matching the filter, newest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<ExportJob>, JobError>;

    /// Count jobs matching the filter.
    fn count(&self, filter: &JobFilter) -> Result<i64, JobError>;

    /// Atomically claim the oldest claimable `Pending` job, transitioning it
    /// to `Processing { phase: Loading, progress: 0 }`. Returns `None` when
    /// the queue is empty. No two callers ever receive the same job.
    fn claim_next_pending(&self) -> Result<Option<ExportJob>, JobError>;

    /// Update a job's state.
    ///
    /// Rejected when the job is already terminal. Progress regressions are
    /// clamped to the previously recorded value so progress never decreases.
    fn update_state(&self, id: &str, new_state: JobState) -> Result<ExportJob, JobError>;

    /// Refresh the heartbeat of a `Processing` job, leaving phase and
    /// progress untouched. Rejected for jobs in any other state so a
    /// worker stops ticking once its job was moved under it.
    fn heartbeat(&self, id: &str) -> Result<(), JobError>;

    /// Mark cooperative cancellation as requested. Pending jobs transition
    /// straight to `Cancelled`; processing jobs only get the flag set and
    /// tear down at their next checkpoint.
    fn request_cancel(&self, id: &str) -> Result<ExportJob, JobError>;

    /// List `Processing` jobs whose heartbeat is older than the cutoff.
    fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExportJob>, JobError>;

    /// Permanently delete a job record. Returns the deleted job if found.
    fn delete(&self, id: &str) -> Result<ExportJob, JobError>;
}
