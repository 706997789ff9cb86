use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState, SharedState};
use super::blob::DiskBlobStore;
use super::db::{DbHandle, IssueDb};
use super::ingest::ImagePolicy;
use crate::config::AppConfig;

/// Configuration for the issue server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub max_image_bytes: usize,
    pub team_token: Option<String>,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.storage.db_path.clone(),
            uploads_dir: config.storage.uploads_dir.clone(),
            max_image_bytes: config.uploads.max_image_bytes,
            team_token: config.auth.team_token.clone(),
            dev_mode: config.server.dev_mode,
        }
    }
}

/// Open the store and wire up the services.
pub fn build_state(config: &ServerConfig) -> Result<SharedState> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    std::fs::create_dir_all(&config.uploads_dir).with_context(|| {
        format!(
            "Failed to create uploads directory {}",
            config.uploads_dir.display()
        )
    })?;

    let db = IssueDb::new(&config.db_path).context("Failed to initialize issue database")?;
    let blobs = Arc::new(DiskBlobStore::new(&config.uploads_dir));
    let policy = ImagePolicy {
        max_bytes: config.max_image_bytes,
    };

    let mut state = AppState::new(DbHandle::new(db), blobs, policy);
    state.team_token = config.team_token.clone();
    state.dev_mode = config.dev_mode;
    Ok(Arc::new(state))
}

/// Build the full application router with request tracing and CORS open to
/// any origin.
pub fn build_router(state: SharedState) -> Router {
    api::api_router(&state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the issue server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let state = build_state(&config)?;
    if state.team_token.is_none() {
        warn!("no team token configured, repair-team routes are open");
    }

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, db = %config.db_path.display(), "civic issue server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
