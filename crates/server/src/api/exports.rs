//! Export job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use slidecast_core::job::{ExportJob, ExportSettings, JobFilter, JobState};
use slidecast_core::orchestrator::{OrchestratorError, SubmitRequest};
use slidecast_core::presentation::BillingError;

use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting an export
#[derive(Debug, Deserialize)]
pub struct SubmitExportBody {
    /// Source presentation id
    pub presentation_id: String,
    /// Narration language (default "en")
    pub language: Option<String>,
    /// Export settings (resolution, frame rate, quality)
    #[serde(default)]
    pub settings: ExportSettings,
    /// Requesting user id
    pub requested_by: Option<String>,
}

/// Query parameters for listing export jobs
#[derive(Debug, Deserialize)]
pub struct ListExportsParams {
    /// Filter by state type
    pub state: Option<String>,
    /// Filter by requesting user
    pub requested_by: Option<String>,
    /// Filter by presentation
    pub presentation_id: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Request body for cancelling or deleting an export
#[derive(Debug, Deserialize)]
pub struct DeleteExportBody {
    /// Acting user id
    pub requested_by: Option<String>,
}

/// Response for export job operations
#[derive(Debug, Serialize)]
pub struct ExportJobResponse {
    pub id: String,
    pub presentation_id: String,
    pub requested_by: String,
    pub language: String,
    pub settings: ExportSettings,
    pub state: JobState,
    /// Convenience 0-100 progress derived from the state.
    pub progress: u8,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ExportJob> for ExportJobResponse {
    fn from(job: ExportJob) -> Self {
        Self {
            id: job.id,
            presentation_id: job.presentation_id,
            requested_by: job.requested_by,
            language: job.language,
            settings: job.settings,
            progress: job.state.progress(),
            state: job.state,
            attempt: job.attempt,
            retry_of: job.retry_of,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Response for listing export jobs
#[derive(Debug, Serialize)]
pub struct ListExportsResponse {
    pub jobs: Vec<ExportJobResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ExportErrorResponse {
    pub error: String,
}

fn error_response(e: OrchestratorError) -> (StatusCode, Json<ExportErrorResponse>) {
    let status = match &e {
        OrchestratorError::JobNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::InvalidState { .. } => StatusCode::CONFLICT,
        OrchestratorError::QueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
        OrchestratorError::Billing(BillingError::InsufficientPoints(_)) => {
            StatusCode::PAYMENT_REQUIRED
        }
        OrchestratorError::Billing(BillingError::Api(_)) => StatusCode::BAD_GATEWAY,
        OrchestratorError::JobStore(_) | OrchestratorError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ExportErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new export job
pub async fn submit_export(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitExportBody>,
) -> Result<(StatusCode, Json<ExportJobResponse>), impl IntoResponse> {
    let request = SubmitRequest {
        presentation_id: body.presentation_id,
        requested_by: body.requested_by.unwrap_or_else(|| "anonymous".to_string()),
        language: body.language.unwrap_or_else(|| "en".to_string()),
        settings: body.settings,
    };

    match state.orchestrator().submit(request).await {
        Ok(job) => Ok((StatusCode::CREATED, Json(ExportJobResponse::from(job)))),
        Err(e) => Err(error_response(e)),
    }
}

/// Get an export job by ID
pub async fn get_export(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExportJobResponse>, impl IntoResponse> {
    match state.jobs().get(&id) {
        Ok(Some(job)) => Ok(Json(ExportJobResponse::from(job))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ExportErrorResponse {
                error: format!("Export job not found: {}", id),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExportErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// List export jobs with optional filters
pub async fn list_exports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListExportsParams>,
) -> Result<Json<ListExportsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref state_filter) = params.state {
        filter = filter.with_state(state_filter);
    }

    if let Some(ref requested_by) = params.requested_by {
        filter = filter.with_requested_by(requested_by);
    }

    if let Some(ref presentation_id) = params.presentation_id {
        filter = filter.with_presentation(presentation_id);
    }

    let jobs = match state.jobs().list(&filter) {
        Ok(jobs) => jobs,
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExportErrorResponse {
                    error: e.to_string(),
                }),
            ));
        }
    };

    // Get total count (without pagination)
    let count_filter = JobFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter.clone()
    };

    let total = match state.jobs().count(&count_filter) {
        Ok(count) => count,
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExportErrorResponse {
                    error: e.to_string(),
                }),
            ));
        }
    };

    Ok(Json(ListExportsResponse {
        jobs: jobs.into_iter().map(ExportJobResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Cancel or delete an export job (DELETE endpoint).
///
/// Non-terminal jobs get a best-effort cancellation (202); terminal jobs
/// are removed permanently along with their stored output (200).
pub async fn delete_export(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<DeleteExportBody>>,
) -> Result<(StatusCode, Json<ExportJobResponse>), impl IntoResponse> {
    let acting_user = body
        .and_then(|b| b.requested_by.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let job = match state.jobs().get(&id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ExportErrorResponse {
                    error: format!("Export job not found: {}", id),
                }),
            ));
        }
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExportErrorResponse {
                    error: e.to_string(),
                }),
            ));
        }
    };

    if job.state.is_terminal() {
        match state.orchestrator().delete(&id, &acting_user).await {
            Ok(deleted) => Ok((StatusCode::OK, Json(ExportJobResponse::from(deleted)))),
            Err(e) => Err(error_response(e)),
        }
    } else {
        match state.orchestrator().cancel(&id, &acting_user).await {
            Ok(job) => Ok((StatusCode::ACCEPTED, Json(ExportJobResponse::from(job)))),
            Err(e) => Err(error_response(e)),
        }
    }
}
