//! Report retrieval

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::db::reports::{self, RequestReports};
use crate::error::{ApiError, ApiResult};
use crate::models::RequestStatus;
use crate::AppState;

/// GET /requests/:id/reports
///
/// The three reports of the last successful run; each is `null` until one
/// has been generated.
pub async fn get_request_reports(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<RequestReports>> {
    let request = crate::db::requests::get_request(&state.db, request_id)
        .await?
        .filter(|r| r.status != RequestStatus::Deleted)
        .ok_or_else(|| ApiError::NotFound(format!("Request not found: {}", request_id)))?;

    let reports = reports::get_reports(&state.db, request.id).await?;
    Ok(Json(reports))
}

pub fn report_routes() -> Router<AppState> {
    Router::new().route("/requests/:id/reports", get(get_request_reports))
}
