//! Request API handlers
//!
//! POST /requests, GET /requests, GET|DELETE /requests/:id,
//! POST /requests/:id/generate

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::requests;
use crate::error::{ApiError, ApiResult, PipelineError};
use crate::models::{GenerationStatus, NewRequest, Request, RequestStatus, RequestSummary};
use crate::services::StartOutcome;
use crate::AppState;

/// GET /requests query
#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub created_by: Option<String>,
}

/// POST /requests/:id/generate response
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub request_id: Uuid,
    pub generation_status: GenerationStatus,
}

/// POST /requests
///
/// Create a draft request over already-uploaded PDFs. Returns 201.
pub async fn create_request(
    State(state): State<AppState>,
    Json(input): Json<NewRequest>,
) -> ApiResult<(StatusCode, Json<Request>)> {
    input
        .validate()
        .map_err(|errors| ApiError::BadRequest(errors.join("; ")))?;

    let request = Request::new(input);
    requests::create_request(&state.db, &request).await?;

    tracing::info!(
        request_id = %request.id,
        created_by = %request.created_by,
        files = request.pdf_files.len(),
        "Request created"
    );

    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /requests?created_by=
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult<Json<Vec<RequestSummary>>> {
    let summaries = requests::list_requests(&state.db, query.created_by.as_deref()).await?;
    Ok(Json(summaries))
}

/// GET /requests/:id
pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<Request>> {
    requests::get_request(&state.db, request_id)
        .await?
        .filter(|r| r.status != RequestStatus::Deleted)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Request not found: {}", request_id)))
}

/// DELETE /requests/:id
///
/// Soft delete. Returns 204.
pub async fn delete_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !requests::soft_delete_request(&state.db, request_id).await? {
        return Err(ApiError::NotFound(format!("Request not found: {}", request_id)));
    }
    tracing::info!(request_id = %request_id, "Request deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /requests/:id/generate
///
/// Claim the request and start generation in the background. Returns 202,
/// or 409 when a run already holds the request.
pub async fn generate_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let outcome = state.orchestrator.start(request_id).await.map_err(|e| {
        let message = e.to_string();
        match e {
            PipelineError::Storage(common) => ApiError::Common(common),
            _ => ApiError::Internal(message),
        }
    });

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            return Err(e);
        }
    };

    match outcome {
        StartOutcome::Started => {
            tracing::info!(request_id = %request_id, "Generation accepted");
            Ok((
                StatusCode::ACCEPTED,
                Json(GenerateResponse {
                    request_id,
                    generation_status: GenerationStatus::InProgress,
                }),
            ))
        }
        StartOutcome::AlreadyInProgress => Err(ApiError::Conflict(format!(
            "Generation already in progress for request {}",
            request_id
        ))),
        StartOutcome::NotFound => Err(ApiError::NotFound(format!(
            "Request not found: {}",
            request_id
        ))),
    }
}

pub fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request).delete(delete_request))
        .route("/requests/:id/generate", post(generate_request))
}
