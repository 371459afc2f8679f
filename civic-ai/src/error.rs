//! Error types for civic-ai
//!
//! `ApiError` is what HTTP handlers return; `PipelineError` is the taxonomy
//! of a generation run.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - generation already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// civic-common error
    #[error("Common error: {0}")]
    Common(#[from] civic_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(civic_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(civic_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised while generating a request's documents and reports
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source PDF unreadable or the converter failed
    #[error("Rasterization failed for {file}: {reason}")]
    RasterizationFailed { file: String, reason: String },

    /// AI backend unreachable or returned an error
    #[error("Extraction call failed: {0}")]
    ExtractionCallFailed(String),

    /// AI response was not the expected document array
    #[error("Extraction output could not be parsed: {0}")]
    ExtractionParseFailed(String),

    /// Clustering output malformed or not an exact partition
    #[error("Invalid cluster format: {0}")]
    InvalidClusterFormat(String),

    /// Conditional update matched no row (request not held by this run)
    #[error("Persistence conflict on request {0}")]
    PersistenceConflict(Uuid),

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] civic_common::Error),
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Storage(civic_common::Error::Database(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_conflict_maps_to_409() {
        let response = ApiError::Conflict("busy".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert_eq!(body["error"]["message"], "busy");
    }

    #[tokio::test]
    async fn test_common_not_found_maps_to_404() {
        let response =
            ApiError::from(civic_common::Error::NotFound("request x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_pipeline_error_messages() {
        let err = PipelineError::RasterizationFailed {
            file: "a.pdf".to_string(),
            reason: "no pages".to_string(),
        };
        assert_eq!(err.to_string(), "Rasterization failed for a.pdf: no pages");
    }
}
