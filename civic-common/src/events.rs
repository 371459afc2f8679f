//! Event types for the civic event system
//!
//! Provides the shared notification definitions and the `EventBus` used to
//! push generation progress to the user who owns a request.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Civic event types
///
/// Every event is addressed to a single user (`user_id`). Events are
/// broadcast via `EventBus`; per-user SSE streams filter on `user_id`.
/// Delivery is best effort: no replay, no backlog for disconnected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CivicEvent {
    /// Pipeline run acquired the request and started processing
    GenerationStarted {
        /// Owner of the request
        user_id: String,
        /// Request being generated
        request_id: Uuid,
        /// Number of source PDFs in the run
        total_files: usize,
        /// When the run started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Incremental progress after a source file was ingested
    ///
    /// Triggers:
    /// - SSE: `generatingReq`
    GeneratingRequest {
        /// Owner of the request
        user_id: String,
        /// Request being generated
        request_id: Uuid,
        /// Documents appended to the request so far
        docs_processed: usize,
        /// When progress was recorded
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Request generation finished and all reports are persisted
    ///
    /// Triggers:
    /// - SSE: `generatedReq`
    GeneratedRequest {
        /// Owner of the request
        user_id: String,
        /// Request that completed
        request_id: Uuid,
        /// When generation completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Request generation failed; request moved to the failed state
    GenerationFailed {
        /// Owner of the request
        user_id: String,
        /// Request that failed
        request_id: Uuid,
        /// Failure description
        error: String,
        /// When the failure was recorded
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CivicEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            CivicEvent::GenerationStarted { .. } => "GenerationStarted",
            CivicEvent::GeneratingRequest { .. } => "GeneratingRequest",
            CivicEvent::GeneratedRequest { .. } => "GeneratedRequest",
            CivicEvent::GenerationFailed { .. } => "GenerationFailed",
        }
    }

    /// Wire name used on the per-user notification channel
    pub fn channel_name(&self) -> &'static str {
        match self {
            CivicEvent::GenerationStarted { .. } => "generationStarted",
            CivicEvent::GeneratingRequest { .. } => "generatingReq",
            CivicEvent::GeneratedRequest { .. } => "generatedReq",
            CivicEvent::GenerationFailed { .. } => "generationFailed",
        }
    }

    /// User the event is addressed to
    pub fn user_id(&self) -> &str {
        match self {
            CivicEvent::GenerationStarted { user_id, .. }
            | CivicEvent::GeneratingRequest { user_id, .. }
            | CivicEvent::GeneratedRequest { user_id, .. }
            | CivicEvent::GenerationFailed { user_id, .. } => user_id,
        }
    }

    /// Request the event refers to
    pub fn request_id(&self) -> Uuid {
        match self {
            CivicEvent::GenerationStarted { request_id, .. }
            | CivicEvent::GeneratingRequest { request_id, .. }
            | CivicEvent::GeneratedRequest { request_id, .. }
            | CivicEvent::GenerationFailed { request_id, .. } => *request_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose the oldest events
///
/// # Examples
///
/// ```
/// use civic_common::events::{CivicEvent, EventBus};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(CivicEvent::GeneratedRequest {
///     user_id: "user-1".to_string(),
///     request_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CivicEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CivicEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CivicEvent,
    ) -> Result<usize, broadcast::error::SendError<CivicEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Notifications are at-most-once; a user with no open stream simply
    /// misses the event.
    pub fn emit_lossy(&self, event: CivicEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for event");
        }
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Channel capacity the bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
