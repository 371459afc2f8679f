//! civic-ai library interface
//!
//! Complaint PDF ingestion: page rasterization, AI extraction, document
//! accumulation and the three aggregate reports, exposed over HTTP.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, PipelineError};

use axum::Router;
use chrono::{DateTime, Utc};
use civic_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::GenerationOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for per-user notifications
    pub event_bus: EventBus,
    /// Starts and runs generation
    pub orchestrator: Arc<GenerationOrchestrator>,
    /// Whether an AI API key was found at startup
    pub ai_configured: bool,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        orchestrator: Arc<GenerationOrchestrator>,
        ai_configured: bool,
    ) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            ai_configured,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::request_routes())
        .merge(api::report_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .with_state(state)
}
