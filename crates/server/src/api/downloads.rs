//! Signed download handler.
//!
//! Serves finished export files. Every request must carry the `expires`
//! and `sig` query parameters issued by the object store's signed URL;
//! anything else is rejected before touching the filesystem.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use slidecast_core::storage::StorageError;

use crate::state::AppState;

/// Query parameters carried by a signed download URL
#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    /// Unix timestamp after which the URL is invalid
    pub expires: i64,
    /// Hex signature over key, expiry and the signing secret
    pub sig: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadErrorResponse {
    pub error: String,
}

fn reject(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(DownloadErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Download a finished export by its storage key
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<DownloadParams>,
) -> Response {
    if let Err(e) = state.objects().verify_signed(&key, params.expires, &params.sig) {
        return match e {
            StorageError::InvalidSignature => reject(StatusCode::FORBIDDEN, e.to_string()),
            StorageError::InvalidKey { .. } => reject(StatusCode::BAD_REQUEST, e.to_string()),
            other => reject(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
    }

    let path = match state.objects().object_path(&key) {
        Ok(path) => path,
        Err(e) => return reject(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let len = bytes.len();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "video/mp4".to_string()),
                    (header::CONTENT_LENGTH, len.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name(&key)),
                    ),
                ],
                Body::from(bytes),
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            reject(StatusCode::NOT_FOUND, format!("object not found: {}", key))
        }
        Err(e) => reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
