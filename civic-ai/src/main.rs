//! civic-ai - Complaint ingestion service
//!
//! Turns scanned complaint PDFs into structured records and per-request
//! aggregate reports. Default port: 5731.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use civic_ai::services::{GeminiClient, GenerationOrchestrator, PdftoppmRasterizer};
use civic_ai::AppState;
use civic_common::config::{self, RootFolderInitializer, RootFolderResolver};
use civic_common::events::EventBus;

const MODULE_NAME: &str = "civic-ai";
const DEFAULT_PORT: u16 = 5731;

/// Command-line arguments for civic-ai
#[derive(Parser, Debug)]
#[command(name = "civic-ai")]
#[command(about = "Complaint PDF ingestion and report generation service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides TOML)
    #[arg(short, long, env = "CIVIC_AI_PORT")]
    port: Option<u16>,

    /// Root folder for database, uploads and page images
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| config::default_config_path(MODULE_NAME));
    let toml_config = config::load_or_default(config_path.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "civic_ai={level},civic_common={level},tower_http=info",
                    level = toml_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting civic-ai (complaint ingestion) service");
    info!(
        "Version: {} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&toml_config)
        .resolve();

    let layout = RootFolderInitializer::new(root_folder);
    layout
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = layout.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = civic_ai::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let stale = civic_ai::db::requests::fail_stale_generations(&db_pool)
        .await
        .context("Failed to release stale generations")?;
    if stale > 0 {
        warn!(count = stale, "Marked generations interrupted by restart as failed");
    }

    let event_bus = EventBus::new(256);

    let api_key = toml_config.resolve_api_key();
    if api_key.is_none() {
        warn!(
            "No AI API key configured (set {} or ai.api_key); generation will fail",
            config::API_KEY_ENV
        );
    }
    let backend = GeminiClient::new(&toml_config.ai, api_key)
        .context("Failed to build AI client")?;
    let ai_configured = backend.is_configured();
    info!(model = %toml_config.ai.model, "AI backend initialized");

    let rasterizer = PdftoppmRasterizer::new(
        toml_config.rasterizer.program.clone(),
        toml_config.rasterizer.dpi,
    );

    let orchestrator = Arc::new(GenerationOrchestrator::new(
        db_pool.clone(),
        event_bus.clone(),
        Arc::new(rasterizer),
        Arc::new(backend),
        layout,
    ));

    let state = AppState::new(db_pool, event_bus, orchestrator, ai_configured);
    let app = civic_ai::build_router(state).layer(TraceLayer::new_for_http());

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
