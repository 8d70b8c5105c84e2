//! Experiment lifecycle routes
//!
//! CRUD on records plus the fetch (git/artifacts) and run (start/stop)
//! operations. Git routes are guarded by [`require_git`] and artifact
//! routes by [`require_archive`], so handlers can assume the record
//! exists and has the right type.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Multipart, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::experiments::{Experiment, ExperimentKind, ExperimentRecord};

use super::error::ApiError;
use super::router::AppState;

fn parse_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::bad_request("invalid experiment id", e.to_string()))
}

fn parse_experiment(payload: Result<Json<Experiment>, JsonRejection>) -> Result<Experiment, ApiError> {
    payload
        .map(|Json(experiment)| experiment)
        .map_err(|e| ApiError::bad_request("invalid experiment info data", e.to_string()))
}

/// `GET /api/exps`
pub async fn list_experiments(State(state): State<AppState>) -> Json<Vec<ExperimentRecord>> {
    Json(state.experiments.list())
}

/// `POST /api/exps`
pub async fn register_experiment(
    State(state): State<AppState>,
    payload: Result<Json<Experiment>, JsonRejection>,
) -> Result<(StatusCode, Json<ExperimentRecord>), ApiError> {
    let experiment = parse_experiment(payload)?;
    let record = state.experiments.register(experiment)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `DELETE /api/exps`
pub async fn clear_experiments(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.experiments.clear()?;
    Ok(StatusCode::OK)
}

/// `GET /api/exps/{id}`
pub async fn get_experiment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ExperimentRecord>, ApiError> {
    let id = parse_id(path)?;
    Ok(Json(state.experiments.get(id)?))
}

/// `PUT /api/exps/{id}`
///
/// Upsert: replaces the meta-information of an existing record (200) or
/// creates a record under the given id (201).
pub async fn update_experiment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<Experiment>, JsonRejection>,
) -> Result<(StatusCode, Json<ExperimentRecord>), ApiError> {
    let id = parse_id(path)?;
    let experiment = parse_experiment(payload)?;

    let (record, created) = state.experiments.update_meta(id, experiment)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(record)))
}

/// `DELETE /api/exps/{id}`
pub async fn delete_experiment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(path)?;
    state.experiments.delete(id)?;
    Ok(StatusCode::OK)
}

/// `POST /api/exps/{id}/git`
pub async fn git_init(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(path)?;
    let (_, output) = state.experiments.git_init(id).await?;
    Ok(Json(json!({
        "message": "experiment initialized successfully",
        "output": output,
    })))
}

/// `PUT /api/exps/{id}/git`
pub async fn git_update(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(path)?;
    let (_, output) = state.experiments.git_update(id).await?;
    Ok(Json(json!({
        "message": "experiment updated successfully",
        "output": output,
    })))
}

/// `POST /api/exps/{id}/git/{branch}`
pub async fn git_switch(
    State(state): State<AppState>,
    path: Result<Path<(Uuid, String)>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path((id, branch)) =
        path.map_err(|e| ApiError::bad_request("invalid experiment id", e.to_string()))?;
    let (record, output) = state.experiments.git_switch(id, &branch).await?;
    Ok(Json(json!({
        "message": "experiment branch switched successfully",
        "branch": record.branch,
        "output": output,
    })))
}

/// `POST /api/exps/{id}/artifacts`
pub async fn install_artifact(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    artifact_upload(state, path, multipart, false).await
}

/// `PUT /api/exps/{id}/artifacts`
pub async fn replace_artifact(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    artifact_upload(state, path, multipart, true).await
}

async fn artifact_upload(
    state: AppState,
    path: Result<Path<Uuid>, PathRejection>,
    mut multipart: Multipart,
    replace: bool,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(path)?;
    let (filename, data) = read_artifact(&mut multipart).await?;

    // Spool the upload so the zip reader can seek in it
    let spool = tempfile::Builder::new()
        .suffix(".zip")
        .tempfile()
        .map_err(|e| ApiError::internal("failed to store uploaded archive", e.to_string()))?;
    tokio::fs::write(spool.path(), &data)
        .await
        .map_err(|e| ApiError::internal("failed to store uploaded archive", e.to_string()))?;

    let record = state
        .experiments
        .install_artifact(id, &filename, spool.path(), replace)
        .await?;

    Ok(Json(json!({
        "message": "experiment artifacts installed successfully",
        "id": record.id,
    })))
}

async fn read_artifact(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request("invalid multipart upload", e.to_string()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request("invalid multipart upload", e.to_string()))?;
        return Ok((filename, data));
    }

    Err(ApiError::bad_request(
        "no artifact uploaded",
        "expected a multipart file field",
    ))
}

/// `POST /api/exps/{id}/start`
pub async fn start_experiment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(path)?;
    start_with_selector(state, id, None).await
}

/// `POST /api/exps/{id}/start/{nickname}`
pub async fn start_experiment_selected(
    State(state): State<AppState>,
    path: Result<Path<(Uuid, String)>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path((id, nickname)) =
        path.map_err(|e| ApiError::bad_request("invalid experiment id", e.to_string()))?;
    start_with_selector(state, id, Some(nickname)).await
}

async fn start_with_selector(
    state: AppState,
    id: Uuid,
    selector: Option<String>,
) -> Result<Json<Value>, ApiError> {
    let started = state.experiments.start(id, selector.as_deref()).await?;
    Ok(Json(json!({
        "message": "experiment started successfully",
        "pid": started.pid,
        "id": started.id,
    })))
}

/// `POST /api/exps/{id}/stop`
pub async fn stop_experiment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    // The id names which experiment the client believes is running; the
    // supervisor only ever has one slot to stop.
    let _id = parse_id(path)?;
    let stopped = state.experiments.stop().await?;
    Ok(Json(json!({
        "message": "experiment stopped successfully",
        "id": stopped.id,
    })))
}

/// Middleware: the experiment must exist and be of git type
pub async fn require_git(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    match check_kind(&state, &params, ExperimentKind::Git) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Middleware: the experiment must exist and be of archive type
pub async fn require_archive(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    match check_kind(&state, &params, ExperimentKind::Archive) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

fn check_kind(
    state: &AppState,
    params: &HashMap<String, String>,
    expected: ExperimentKind,
) -> Result<(), ApiError> {
    let raw = params
        .get("id")
        .ok_or_else(|| ApiError::bad_request("invalid experiment id", "missing id parameter"))?;
    let id = Uuid::parse_str(raw)
        .map_err(|e| ApiError::bad_request("invalid experiment id", e.to_string()))?;

    let record = state.experiments.get(id)?;
    if record.experiment.kind != expected {
        return Err(ApiError::bad_request(
            format!("experiment type is not {}", expected),
            format!("experiment type is {}", record.experiment.kind),
        ));
    }
    Ok(())
}
