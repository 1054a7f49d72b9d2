//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API from environment variables alone.
//!
//! ## Intended use
//! Handy for development and containers. The workspace's main `depot` binary adds command-line
//! flags, the TOML configuration file and the one-shot restore mode.

use depot_api_rest::{router, AppState, DEFAULT_MAX_UPLOAD_BYTES};
use depot_core::{constants, CoreConfig, DefaultPaths, MetadataEngine, StorageBackend};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the Depot REST API server
///
/// # Environment Variables
/// - `DEPOT_ADDR`: server address (default: "0.0.0.0:8080")
/// - `DEPOT_BASE_DIR`: store root (default: "~/.depot")
/// - `DEPOT_CACHE_DIR`: index directory (default: "~/.cache/depot")
/// - `DEPOT_BACKEND`: `sled` or `memory` (default: "sled")
/// - `DEPOT_MAX_UPLOAD_BYTES`: request body limit for uploads
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the indices cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depot_api_rest=info".parse()?)
                .add_directive("depot_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = DefaultPaths::for_current_user()?;

    let addr = std::env::var("DEPOT_ADDR").unwrap_or_else(|_| constants::DEFAULT_ADDR.into());
    let base_dir = std::env::var("DEPOT_BASE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.base_dir);
    let cache_dir = std::env::var("DEPOT_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);
    let backend = match std::env::var("DEPOT_BACKEND") {
        Ok(value) => value.parse::<StorageBackend>()?,
        Err(_) => StorageBackend::default(),
    };
    let max_upload_bytes = match std::env::var("DEPOT_MAX_UPLOAD_BYTES") {
        Ok(value) => value.parse::<usize>()?,
        Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
    };

    let cfg = CoreConfig::new(base_dir, cache_dir, backend)?;
    let engine = MetadataEngine::open(&cfg)?;
    let root = std::fs::canonicalize(cfg.base_dir())?;

    tracing::info!("-- Starting Depot REST API on {}", addr);
    tracing::info!("-- Serving {}", root.display());

    let app = router(AppState::new(engine, root), max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
