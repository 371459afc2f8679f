//! Service readiness
//!
//! Reports whether generation can run: database reachable, AI key present,
//! runs in flight and the latest failures.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::db::requests;
use crate::AppState;

/// Build identification baked in by `build.rs`
#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub timestamp: &'static str,
    pub profile: &'static str,
}

const BUILD: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    git_hash: env!("GIT_HASH"),
    timestamp: env!("BUILD_TIMESTAMP"),
    profile: env!("BUILD_PROFILE"),
};

/// GET /health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", "degraded" (no AI key) or "error" (database unreachable)
    pub status: &'static str,
    pub module: &'static str,
    pub build: &'static BuildInfo,
    pub uptime_seconds: u64,
    pub database_ok: bool,
    pub ai_configured: bool,
    /// Requests currently holding the generation lock
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generations_in_progress: Option<usize>,
    /// Last generation run failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_generation_error: Option<String>,
    /// Last error returned by an API handler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn overall_status(database_ok: bool, ai_configured: bool) -> &'static str {
    match (database_ok, ai_configured) {
        (false, _) => "error",
        (true, false) => "degraded",
        (true, true) => "ok",
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let in_progress = match requests::count_in_progress(&state.db).await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            None
        }
    };
    let database_ok = in_progress.is_some();

    Json(HealthResponse {
        status: overall_status(database_ok, state.ai_configured),
        module: "civic-ai",
        build: &BUILD,
        uptime_seconds: (Utc::now() - state.startup_time).num_seconds().max(0) as u64,
        database_ok,
        ai_configured: state.ai_configured,
        generations_in_progress: in_progress,
        last_generation_error: state.orchestrator.last_failure().await,
        last_error: state.last_error.read().await.clone(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_prefers_database_errors() {
        assert_eq!(overall_status(true, true), "ok");
        assert_eq!(overall_status(true, false), "degraded");
        assert_eq!(overall_status(false, true), "error");
        assert_eq!(overall_status(false, false), "error");
    }
}
