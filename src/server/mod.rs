//! HTTP surface: axum router, shared state and the serve loop.

mod error;
pub mod handlers;
mod state;

pub use error::ApiError;
pub use state::{AppState, SharedState};

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::log_store::LogStoreError;
use crate::storage::StorageError;

/// Prefix every API route is mounted under
pub const API_PREFIX: &str = "/api/v1";

/// Errors that stop the service
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage lifecycle error: {0}")]
    Storage(#[from] StorageError),

    #[error("Log store lifecycle error: {0}")]
    LogStore(#[from] LogStoreError),
}

/// Build the full router.
///
/// The API routes live under [`API_PREFIX`]:
/// `POST /api/v1/search_download_articles/` and `POST /api/v1/chat/`.
/// Nothing is served at the bare `/search_download_articles/` or `/chat/`.
/// `GET /health` sits at the root.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    let api = Router::new()
        .route("/search_download_articles/", post(handlers::search_download_articles))
        .route("/chat/", post(handlers::chat));

    Router::new()
        .nest(API_PREFIX, api)
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Run the startup hook, serve until Ctrl-C or SIGTERM, then run the
/// shutdown hook.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), ServerError> {
    state.startup().await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    let app = build_router(state.clone());
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // the shutdown hook runs even when the listener failed
    let stopped = state.shutdown().await;
    served?;
    stopped?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
