//! Generation pipeline orchestrator
//!
//! Sequence for one request:
//! 1. Claim: `draft | completed | failed → inProgress` (single conditional UPDATE)
//! 2. Per source file, in order: rasterize → extract → accumulate.
//!    A file that fails to rasterize or extract is skipped.
//! 3. Common-problem clustering, ward clustering and ward tally over the
//!    accumulated documents; all three must succeed.
//! 4. Persist the three reports in one transaction, then `→ completed`.
//!
//! Any failure after the claim moves the request to `failed` so it can be
//! triggered again. The owner is notified at start, after each ingested file,
//! and at the end.

use civic_common::config::RootFolderInitializer;
use civic_common::events::{CivicEvent, EventBus};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::accumulator::Accumulator;
use super::ai_client::CompletionBackend;
use super::common_problems::CommonProblemClusterer;
use super::extractor::Extractor;
use super::rasterizer::PageRasterizer;
use super::ward_clusterer::WardClusterer;
use super::ward_tally::tally_wards;
use crate::db::reports::{self, SaveOutcome};
use crate::db::requests::{self, GenerationClaim};
use crate::error::PipelineError;
use crate::models::{
    CommonProblemReport, Request, RequestStatus, WardAnalysisReport, WardReport,
};
use crate::utils::retry_on_lock;

/// Result of a generation trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Claimed; the run continues in the background
    Started,
    AlreadyInProgress,
    NotFound,
}

/// What happened to one source file
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Ingested {
        file: String,
        pages: usize,
        documents: usize,
    },
    Skipped {
        file: String,
        reason: String,
    },
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub request_id: Uuid,
    pub files: Vec<FileOutcome>,
    pub document_count: usize,
    pub common_groups: usize,
    pub ward_groups: usize,
    pub wards_tallied: usize,
}

impl RunSummary {
    pub fn skipped_files(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Skipped { .. }))
            .count()
    }
}

pub struct GenerationOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    rasterizer: Arc<dyn PageRasterizer>,
    extractor: Extractor,
    accumulator: Accumulator,
    common_clusterer: CommonProblemClusterer,
    ward_clusterer: WardClusterer,
    layout: RootFolderInitializer,
    /// Most recent run failure, for diagnostics
    last_failure: RwLock<Option<String>>,
}

impl GenerationOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        rasterizer: Arc<dyn PageRasterizer>,
        backend: Arc<dyn CompletionBackend>,
        layout: RootFolderInitializer,
    ) -> Self {
        Self {
            extractor: Extractor::new(backend.clone(), layout.root_folder().to_path_buf()),
            accumulator: Accumulator::new(db.clone(), event_bus.clone()),
            common_clusterer: CommonProblemClusterer::new(backend.clone()),
            ward_clusterer: WardClusterer::new(backend),
            db,
            event_bus,
            rasterizer,
            layout,
            last_failure: RwLock::new(None),
        }
    }

    /// Claim the request and run generation in a background task
    ///
    /// Returns as soon as the claim is decided.
    pub async fn start(self: &Arc<Self>, request_id: Uuid) -> Result<StartOutcome, PipelineError> {
        let request = match self.claim(request_id).await? {
            Some(request) => request,
            None => {
                return Ok(match requests::get_request(&self.db, request_id).await? {
                    Some(r) if r.status != RequestStatus::Deleted => {
                        StartOutcome::AlreadyInProgress
                    }
                    _ => StartOutcome::NotFound,
                })
            }
        };

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(request_id = %request_id, "Background generation task started");
            let user_id = request.created_by.clone();
            let worker = Arc::clone(&orchestrator);
            // A panic inside the run surfaces here as a JoinError
            match tokio::spawn(async move { worker.run(request).await }).await {
                Ok(Ok(summary)) => tracing::info!(
                    request_id = %request_id,
                    documents = summary.document_count,
                    skipped_files = summary.skipped_files(),
                    "Background generation task completed"
                ),
                Ok(Err(e)) => tracing::error!(
                    request_id = %request_id,
                    error = %e,
                    "Background generation task failed"
                ),
                Err(join_err) => {
                    orchestrator
                        .record_failure(
                            request_id,
                            &user_id,
                            format!("Generation task aborted: {}", join_err),
                        )
                        .await;
                }
            }
        });

        Ok(StartOutcome::Started)
    }

    /// Take the generation lock; `None` when another run holds it or the
    /// request is missing
    pub async fn claim(&self, request_id: Uuid) -> Result<Option<Request>, PipelineError> {
        match requests::try_begin_generation(&self.db, request_id).await? {
            GenerationClaim::Acquired => {
                let request = requests::get_request(&self.db, request_id)
                    .await?
                    .ok_or_else(|| {
                        civic_common::Error::NotFound(format!("request {}", request_id))
                    })?;
                Ok(Some(request))
            }
            GenerationClaim::AlreadyInProgress | GenerationClaim::NotFound => Ok(None),
        }
    }

    /// Run generation for a request already claimed by this caller
    ///
    /// On error the request is moved to `failed` and the owner notified.
    pub async fn run(&self, request: Request) -> Result<RunSummary, PipelineError> {
        tracing::info!(
            request_id = %request.id,
            files = request.pdf_files.len(),
            "Generation started"
        );
        self.event_bus.emit_lossy(CivicEvent::GenerationStarted {
            user_id: request.created_by.clone(),
            request_id: request.id,
            total_files: request.pdf_files.len(),
            timestamp: chrono::Utc::now(),
        });

        match self.execute(&request).await {
            Ok(summary) => {
                self.event_bus.emit_lossy(CivicEvent::GeneratedRequest {
                    user_id: request.created_by.clone(),
                    request_id: request.id,
                    timestamp: chrono::Utc::now(),
                });
                Ok(summary)
            }
            Err(e) => {
                self.record_failure(request.id, &request.created_by, e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    /// Last run failure seen by this orchestrator, prefixed with its request id
    pub async fn last_failure(&self) -> Option<String> {
        self.last_failure.read().await.clone()
    }

    /// Move the request to `failed` and notify its owner
    async fn record_failure(&self, request_id: Uuid, user_id: &str, message: String) {
        tracing::error!(request_id = %request_id, error = %message, "Generation failed");
        *self.last_failure.write().await = Some(format!("{}: {}", request_id, message));

        match requests::mark_failed(&self.db, request_id, &message).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                request_id = %request_id,
                "Request no longer in progress; failure not recorded"
            ),
            Err(db_err) => tracing::error!(
                request_id = %request_id,
                error = %db_err,
                "Failed to record generation failure"
            ),
        }

        self.event_bus.emit_lossy(CivicEvent::GenerationFailed {
            user_id: user_id.to_string(),
            request_id,
            error: message,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn execute(&self, request: &Request) -> Result<RunSummary, PipelineError> {
        let out_dir = self.layout.generated_dir(request.id);
        let mut files = Vec::with_capacity(request.pdf_files.len());
        let mut first_failure: Option<PipelineError> = None;

        for file in &request.pdf_files {
            match self.ingest_file(request, file, &out_dir).await {
                Ok((pages, documents)) => {
                    tracing::info!(
                        request_id = %request.id,
                        file = %file,
                        pages,
                        documents,
                        "File ingested"
                    );
                    files.push(FileOutcome::Ingested {
                        file: file.clone(),
                        pages,
                        documents,
                    });
                }
                Err(
                    e @ (PipelineError::RasterizationFailed { .. }
                    | PipelineError::ExtractionCallFailed(_)
                    | PipelineError::ExtractionParseFailed(_)),
                ) => {
                    tracing::warn!(
                        request_id = %request.id,
                        file = %file,
                        error = %e,
                        "Skipping file"
                    );
                    files.push(FileOutcome::Skipped {
                        file: file.clone(),
                        reason: e.to_string(),
                    });
                    first_failure.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        let all_failed = !files.is_empty()
            && files.iter().all(|f| matches!(f, FileOutcome::Skipped { .. }));
        if all_failed {
            if let Some(e) = first_failure {
                return Err(e);
            }
        }

        let documents = requests::load_documents(&self.db, request.id).await?;
        tracing::info!(
            request_id = %request.id,
            documents = documents.len(),
            "Building reports"
        );

        let tally = tally_wards(&documents);
        let (common_groups, ward_groups) = tokio::try_join!(
            self.common_clusterer.cluster(&documents),
            self.ward_clusterer.cluster(&documents),
        )?;

        let common = CommonProblemReport::new(request.id, common_groups);
        let wards = WardReport::new(request.id, ward_groups);
        let analysis = WardAnalysisReport::new(request.id, tally);

        let outcome = retry_on_lock("save reports", || {
            reports::save_reports(&self.db, &common, &wards, &analysis)
        })
        .await
        .map_err(|e| match e {
            civic_common::Error::InvalidInput(reason) => PipelineError::InvalidClusterFormat(reason),
            other => PipelineError::Storage(other),
        })?;
        if outcome == SaveOutcome::NotHeld {
            return Err(PipelineError::PersistenceConflict(request.id));
        }

        if !requests::mark_completed(&self.db, request.id).await? {
            return Err(PipelineError::PersistenceConflict(request.id));
        }

        tracing::info!(
            request_id = %request.id,
            documents = documents.len(),
            common_groups = common.common_problems.len(),
            wards = wards.wards.len(),
            "Generation completed"
        );

        Ok(RunSummary {
            request_id: request.id,
            files,
            document_count: documents.len(),
            common_groups: common.common_problems.len(),
            ward_groups: wards.wards.len(),
            wards_tallied: analysis.wards.len(),
        })
    }

    /// Rasterize, extract and append one source file; returns (pages, documents)
    async fn ingest_file(
        &self,
        request: &Request,
        file: &str,
        out_dir: &Path,
    ) -> Result<(usize, usize), PipelineError> {
        let pdf = resolve_source(self.layout.root_folder(), file);

        let pages = self
            .rasterizer
            .rasterize(&pdf, out_dir)
            .await
            .map_err(|e| PipelineError::RasterizationFailed {
                file: file.to_string(),
                reason: e.to_string(),
            })?;

        let documents = self.extractor.extract(&pages, file).await?;

        self.accumulator
            .append(request.id, &request.created_by, &documents)
            .await?;

        Ok((pages.len(), documents.len()))
    }

}

/// Source references are relative to the root folder (leading `/` allowed);
/// absolute paths already inside the root are used as-is
pub fn resolve_source(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() && path.starts_with(root) {
        return path.to_path_buf();
    }
    root.join(file.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_path_resolution() {
        let root = Path::new("/srv/civic");
        let resolve = |file: &str| resolve_source(root, file);
        assert_eq!(resolve("/uploads/pdf/a.pdf"), PathBuf::from("/srv/civic/uploads/pdf/a.pdf"));
        assert_eq!(resolve("uploads/pdf/a.pdf"), PathBuf::from("/srv/civic/uploads/pdf/a.pdf"));
        assert_eq!(resolve("/srv/civic/uploads/pdf/a.pdf"), PathBuf::from("/srv/civic/uploads/pdf/a.pdf"));
    }

    #[test]
    fn test_summary_counts_skipped() {
        let summary = RunSummary {
            request_id: Uuid::nil(),
            files: vec![
                FileOutcome::Ingested { file: "a".to_string(), pages: 1, documents: 1 },
                FileOutcome::Skipped { file: "b".to_string(), reason: "x".to_string() },
            ],
            document_count: 1,
            common_groups: 1,
            ward_groups: 1,
            wards_tallied: 1,
        };
        assert_eq!(summary.skipped_files(), 1);
    }
}
