//! Server-Sent Events (SSE) utilities
//!
//! Per-user notification streams for civic services.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::events::EventBus;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Create an SSE stream carrying only the events addressed to `user_id`
///
/// Each `CivicEvent` is sent with its channel name (`generatingReq`,
/// `generatedReq`, ...) as the SSE event name and its JSON as data.
/// Lagged receivers skip the events they missed; there is no replay.
///
/// # Example
/// ```rust,ignore
/// pub async fn user_events(
///     State(state): State<AppState>,
///     Path(user_id): Path<String>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     civic_common::sse::user_event_stream(&state.event_bus, user_id)
/// }
/// ```
pub fn user_event_stream(
    bus: &EventBus,
    user_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = %user_id, "New SSE client connected to notifications");

    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) if event.user_id() == user_id => {
                            match serde_json::to_string(&event) {
                                Ok(json) => {
                                    yield Ok(Event::default()
                                        .event(event.channel_name())
                                        .data(json));
                                }
                                Err(e) => {
                                    warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(user_id = %user_id, skipped, "SSE: Subscriber lagged, events dropped");
                        }
                        Err(RecvError::Closed) => {
                            info!(user_id = %user_id, "SSE: Event bus closed");
                            break;
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
