//! Broadcast routes
//!
//! Topic management, raw-byte publishing, and the two SSE endpoints
//! (topic subscription and the synthetic trial stream).

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::broadcast::mock;

use super::error::ApiError;
use super::router::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct TopicList {
    broadcast_endpoints: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateTopic {
    name: String,
}

/// `GET /api/broadcast/data`
pub async fn list_topics(State(state): State<AppState>) -> Json<TopicList> {
    Json(TopicList {
        broadcast_endpoints: state.hub.list(),
    })
}

/// `POST /api/broadcast/data`
pub async fn create_topic(
    State(state): State<AppState>,
    payload: Result<Json<CreateTopic>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload
        .map_err(|e| ApiError::bad_request("without valid broadcast name", e.to_string()))?;
    if request.name.is_empty() {
        return Err(ApiError::bad_request(
            "without valid broadcast name",
            "name must not be empty",
        ));
    }

    state.hub.create(&request.name)?;
    Ok(StatusCode::CREATED)
}

/// `POST /api/broadcast/data/{name}`
pub async fn publish_topic(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.hub.publish(&name, body)?;
    Ok(StatusCode::OK)
}

/// `GET /api/broadcast/data/{name}`
///
/// Streams the topic as server-sent events: history replay first, then
/// live publishes until the client disconnects or the topic is deleted.
pub async fn subscribe_topic(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state.hub.subscribe(&name)?;
    let stream = subscription.map(|payload| Ok(message_event(&payload)));
    Ok(Sse::new(stream))
}

/// `DELETE /api/broadcast/data/{name}`
pub async fn delete_topic(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.hub.delete(&name)?;
    Ok(StatusCode::OK)
}

/// `GET /api/broadcast/data/mock`
///
/// Synthetic trial records until the client disconnects; dropping the
/// response body cancels the generator.
pub async fn mock_stream() -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = mock::trial_stream().map(|record| Event::default().event("message").json_data(&record));
    Sse::new(stream)
}

/// Build the `message` event for a raw payload
///
/// SSE is a text protocol: payload bytes go out lossily as UTF-8, with
/// carriage returns folded into newlines so multi-line payloads become
/// multiple `data:` lines.
fn message_event(payload: &Bytes) -> Event {
    let text = String::from_utf8_lossy(payload)
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    Event::default().event("message").data(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_event_normalizes_line_endings() {
        let event = message_event(&Bytes::from_static(b"a\r\nb\rc"));
        let rendered = format!("{:?}", event);

        // Both carriage-return forms become plain newlines
        assert!(!rendered.contains("\\r"));
    }
}
