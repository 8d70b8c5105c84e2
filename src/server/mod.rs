//! HTTP surface
//!
//! Exposes the coordinator over cleartext HTTP on port 9012. All routes
//! live under `/api`; errors are JSON envelopes of the form
//! `{"error": "...", "detail": "..."}`; subscriptions are long-lived
//! `text/event-stream` responses flushed per event.
//!
//! The router holds no state of its own: every component is constructed
//! by the embedding binary and injected through [`AppState`], so tests
//! can assemble as many independent coordinators as they like.

pub mod alive_api;
pub mod broadcast_api;
pub mod config;
pub mod error;
pub mod experiments_api;
pub mod proxy_api;
pub mod router;
pub mod status_api;

pub use config::ServerConfig;
pub use error::ApiError;
pub use router::{router, AppState};
pub use status_api::{ExperimentStatus, StatusBoard};

use crate::error::Result;

/// Serve the coordinator until the process ends
pub async fn serve(state: AppState, config: ServerConfig) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Coordinator listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Serve the coordinator until `shutdown` resolves
pub async fn serve_until<F>(state: AppState, config: ServerConfig, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Coordinator listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Coordinator shut down");
    Ok(())
}
