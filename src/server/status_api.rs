//! Experiment status board
//!
//! A tiny piece of shared state that experiment processes PATCH and
//! dashboards poll. Updates are partial: a PATCH may carry `id`,
//! `is_running`, or both.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::error::ApiError;
use super::router::AppState;

/// What the currently reported experiment looks like
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExperimentStatus {
    pub id: String,
    pub is_running: bool,
}

/// Shared status board
#[derive(Debug, Default)]
pub struct StatusBoard {
    current: Mutex<ExperimentStatus>,
}

impl StatusBoard {
    /// Current status snapshot
    pub fn snapshot(&self) -> ExperimentStatus {
        self.current.lock().clone()
    }

    /// Apply a partial update; unknown fields are ignored
    pub fn apply(&self, update: &Value) -> Result<ExperimentStatus, ApiError> {
        let mut current = self.current.lock();

        if let Some(id) = update.get("id") {
            match id.as_str() {
                Some(id) => current.id = id.to_string(),
                None => {
                    return Err(ApiError::bad_request(
                        "failed to update id field",
                        "id field must be a string",
                    ));
                }
            }
        }

        if let Some(is_running) = update.get("is_running") {
            match is_running.as_bool() {
                Some(is_running) => current.is_running = is_running,
                None => {
                    return Err(ApiError::bad_request(
                        "failed to update is_running field",
                        "is_running field must be a boolean",
                    ));
                }
            }
        }

        Ok(current.clone())
    }
}

/// `GET /api/status`
pub async fn get_status(State(state): State<AppState>) -> Json<ExperimentStatus> {
    Json(state.status.snapshot())
}

/// `PATCH /api/status`
pub async fn update_status(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ExperimentStatus>, ApiError> {
    let Json(update) =
        payload.map_err(|e| ApiError::bad_request("failed to bind JSON", e.to_string()))?;
    if !update.is_object() {
        return Err(ApiError::bad_request(
            "failed to bind JSON",
            "expected a JSON object",
        ));
    }

    Ok(Json(state.status.apply(&update)?))
}
