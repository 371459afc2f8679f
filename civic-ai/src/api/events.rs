//! Per-user notification stream

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /users/:user_id/events
///
/// SSE stream of generation notifications for requests owned by `user_id`.
pub async fn user_events(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    civic_common::sse::user_event_stream(&state.event_bus, user_id)
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/users/:user_id/events", get(user_events))
}
