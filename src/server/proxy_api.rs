//! Command proxy routes

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;

use crate::proxy::ProxyEndpoint;

use super::error::ApiError;
use super::router::AppState;

/// `GET /api/cmds/proxies`
pub async fn list_proxies(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProxyEndpoint>>, ApiError> {
    let endpoints = state.proxies.list().await;
    if endpoints.is_empty() {
        return Err(ApiError::not_found("no command proxies found"));
    }
    Ok(Json(endpoints))
}

/// `POST /api/cmds/proxies`
pub async fn create_proxy(
    State(state): State<AppState>,
    payload: Result<Json<ProxyEndpoint>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(endpoint) =
        payload.map_err(|e| ApiError::bad_request("invalid proxy endpoint", e.to_string()))?;
    if endpoint.nickname.is_empty() || endpoint.hostname.is_empty() {
        return Err(ApiError::bad_request(
            "invalid proxy endpoint",
            "nickname and hostname must not be empty",
        ));
    }

    state.proxies.create(endpoint).await?;
    Ok(StatusCode::CREATED)
}

/// `POST /api/cmds/proxies/{nickname}`
///
/// One request/reply roundtrip; the worker's reply bytes come back
/// verbatim.
pub async fn send_command(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let reply = state.proxies.send(&nickname, body).await?;
    Ok((
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, "application/json")],
        reply,
    )
        .into_response())
}

/// `DELETE /api/cmds/proxies`
pub async fn delete_all_proxies(State(state): State<AppState>) -> StatusCode {
    state.proxies.delete_all().await;
    StatusCode::OK
}

/// `DELETE /api/cmds/proxies/{nickname}`
pub async fn delete_proxy(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.proxies.delete(&nickname).await?;
    Ok(StatusCode::OK)
}
