//! Route table and shared state
//!
//! Wires the injected components to the `/api` surface. The state is a
//! bundle of `Arc`s, so cloning the router for concurrent requests (or
//! tests) shares the same coordinator underneath.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::broadcast::BroadcastHub;
use crate::experiments::ExperimentService;
use crate::proxy::ProxyRegistry;

use super::alive_api;
use super::broadcast_api;
use super::experiments_api;
use super::proxy_api;
use super::status_api;
use super::status_api::StatusBoard;

/// Shared state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub proxies: Arc<ProxyRegistry>,
    pub experiments: Arc<ExperimentService>,
    pub status: Arc<StatusBoard>,
}

/// Build the `/api` router over the given state
pub fn router(state: AppState) -> Router {
    let git_routes = Router::new()
        .route(
            "/exps/{id}/git",
            post(experiments_api::git_init).put(experiments_api::git_update),
        )
        .route("/exps/{id}/git/{branch}", post(experiments_api::git_switch))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            experiments_api::require_git,
        ));

    let artifact_routes = Router::new()
        .route(
            "/exps/{id}/artifacts",
            post(experiments_api::install_artifact).put(experiments_api::replace_artifact),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            experiments_api::require_archive,
        ));

    let api = Router::new()
        .route(
            "/broadcast/data",
            get(broadcast_api::list_topics).post(broadcast_api::create_topic),
        )
        .route("/broadcast/data/mock", get(broadcast_api::mock_stream))
        .route(
            "/broadcast/data/{name}",
            get(broadcast_api::subscribe_topic)
                .post(broadcast_api::publish_topic)
                .delete(broadcast_api::delete_topic),
        )
        .route(
            "/cmds/proxies",
            get(proxy_api::list_proxies)
                .post(proxy_api::create_proxy)
                .delete(proxy_api::delete_all_proxies),
        )
        .route(
            "/cmds/proxies/{nickname}",
            post(proxy_api::send_command).delete(proxy_api::delete_proxy),
        )
        .route(
            "/exps",
            get(experiments_api::list_experiments)
                .post(experiments_api::register_experiment)
                .delete(experiments_api::clear_experiments),
        )
        .route(
            "/exps/{id}",
            get(experiments_api::get_experiment)
                .put(experiments_api::update_experiment)
                .delete(experiments_api::delete_experiment),
        )
        .merge(git_routes)
        .merge(artifact_routes)
        .route("/exps/{id}/start", post(experiments_api::start_experiment))
        .route(
            "/exps/{id}/start/{nickname}",
            post(experiments_api::start_experiment_selected),
        )
        .route("/exps/{id}/stop", post(experiments_api::stop_experiment))
        .route("/alive", get(alive_api::alive))
        .route(
            "/status",
            get(status_api::get_status).patch(status_api::update_status),
        );

    Router::new().nest("/api", api).with_state(state)
}
