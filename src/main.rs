//! Coordinator binary
//!
//! Builds one of everything, roots the experiment store under the
//! platform data home, and serves until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use cogrelay::experiments::ExperimentService;
use cogrelay::proxy::{ProxyConfig, ProxyRegistry};
use cogrelay::server::{self, AppState, ServerConfig};
use cogrelay::BroadcastHub;

/// Application directory under the platform data home
const APP_DIR: &str = "cogrelay";

/// Message timeout for proxy sessions; workers answer fast or not at all
const PROXY_MSG_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let data_home = dirs::data_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
    let experiments_dir = data_home.join(APP_DIR).join("experiments");
    tracing::debug!(dir = %experiments_dir.display(), "Experiments directory");

    let state = AppState {
        hub: Arc::new(BroadcastHub::new()),
        proxies: Arc::new(ProxyRegistry::new(ProxyConfig::new(PROXY_MSG_TIMEOUT))),
        experiments: Arc::new(ExperimentService::open(experiments_dir)?),
        status: Default::default(),
    };

    server::serve_until(state, ServerConfig::default(), async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
