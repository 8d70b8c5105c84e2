//! API error envelope
//!
//! Every component failure turns into the same JSON envelope with a
//! status code from the error table: 400 for malformed input, 404 for
//! unknown names, 409 for conflicts, 503 for sessions that cannot take a
//! command, 504 for exhausted lazy-pirate retries, 500 for the rest.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::broadcast::HubError;
use crate::experiments::error::ProcessError;
use crate::experiments::error::SourceError;
use crate::experiments::ExperimentError;
use crate::proxy::ProxyError;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

/// An HTTP error response with the standard envelope
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        error: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                detail: detail.into(),
            },
        }
    }

    pub fn bad_request(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, detail)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error, "")
    }

    pub fn conflict(error: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, error, "")
    }

    pub fn internal(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match &e {
            HubError::TopicNotFound(_) => ApiError::not_found(e.to_string()),
            HubError::TopicAlreadyExists(_) => ApiError::conflict(e.to_string()),
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(e: ProxyError) -> Self {
        match &e {
            ProxyError::SessionNotFound(_) => ApiError::not_found(e.to_string()),
            ProxyError::SessionAlreadyExists(_) => ApiError::conflict(e.to_string()),
            ProxyError::SessionClosed | ProxyError::SessionUnavailable => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string(), "")
            }
            ProxyError::RetriesExhausted { .. } => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, e.to_string(), "")
            }
            ProxyError::Handshake(_) | ProxyError::Transport(_) => {
                ApiError::internal(e.to_string(), "")
            }
        }
    }
}

impl From<ExperimentError> for ApiError {
    fn from(e: ExperimentError) -> Self {
        match &e {
            ExperimentError::NotFound(_) => ApiError::not_found(e.to_string()),
            ExperimentError::NicknameTaken(_) => ApiError::conflict(e.to_string()),
            ExperimentError::InvalidState(_) | ExperimentError::InvalidRecord(_) => {
                ApiError::bad_request(e.to_string(), "")
            }
            ExperimentError::Store(inner) => {
                ApiError::internal("failed to persist experiment records", inner.to_string())
            }
            ExperimentError::Source(inner) => match inner {
                SourceError::InvalidArchive(_) | SourceError::MissingAddress => {
                    ApiError::bad_request(inner.to_string(), "")
                }
                _ => ApiError::internal("experiment source operation failed", inner.to_string()),
            },
            ExperimentError::Process(inner) => match inner {
                ProcessError::AlreadyRunning => ApiError::conflict(inner.to_string()),
                ProcessError::NoneRunning => ApiError::not_found(inner.to_string()),
                ProcessError::InvalidRecord(_) => ApiError::bad_request(inner.to_string(), ""),
                ProcessError::Spawn(_) | ProcessError::Kill(_) => {
                    ApiError::internal("experiment process operation failed", inner.to_string())
                }
            },
        }
    }
}
