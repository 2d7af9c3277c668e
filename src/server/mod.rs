//! HTTP surface
//!
//! JSON API over the catalog plus the cached image files. Handlers share one
//! [`AppState`]; every failure is answered with a `{"message": ...}` body.

mod error;
mod handlers;
mod upload;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::cache::{Catalog, ImageCache, Pager};
use crate::search::SharedSearch;

pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub images: Arc<ImageCache>,
    pub search: SharedSearch,
    pub pager: Pager,
    /// Scratch directory for multipart uploads
    pub upload_dir: PathBuf,
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::usage))
        .route("/api/items", get(handlers::items))
        .route("/api/itemCount", get(handlers::item_count))
        .route("/api/recipes", get(handlers::recipes))
        .route("/api/initialize", get(handlers::initialize))
        .route("/api/folders", get(handlers::folders))
        .route("/api/files", get(handlers::files))
        .route("/api/upload", post(upload::upload))
        .route("/image/:image_name", get(handlers::image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Bind `0.0.0.0:<port>` and serve until Ctrl+C or SIGTERM
pub async fn serve(state: Arc<AppState>, port: u16, max_upload_bytes: usize) -> Result<()> {
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload dir {}", state.upload_dir.display()))?;

    let app = router(state, max_upload_bytes);
    let address = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(%address, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
