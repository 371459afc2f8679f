//! Ingestion accumulator
//!
//! Appends a file's documents to the request and reports progress to the
//! request owner. Safe to call concurrently for the same request.

use civic_common::events::{CivicEvent, EventBus};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::requests;
use crate::error::PipelineError;
use crate::models::Document;
use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct Accumulator {
    db: SqlitePool,
    event_bus: EventBus,
}

impl Accumulator {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Append `documents` and bump the count atomically; returns the new count
    ///
    /// Fails with `PersistenceConflict` when the request is not `inProgress`.
    pub async fn append(
        &self,
        request_id: Uuid,
        user_id: &str,
        documents: &[Document],
    ) -> Result<usize, PipelineError> {
        let count = retry_on_lock("append documents", || {
            requests::append_documents(&self.db, request_id, documents)
        })
        .await?
        .ok_or(PipelineError::PersistenceConflict(request_id))?;

        tracing::debug!(
            request_id = %request_id,
            appended = documents.len(),
            document_count = count,
            "Documents accumulated"
        );

        self.event_bus.emit_lossy(CivicEvent::GeneratingRequest {
            user_id: user_id.to_string(),
            request_id,
            docs_processed: count,
            timestamp: chrono::Utc::now(),
        });

        Ok(count)
    }
}
