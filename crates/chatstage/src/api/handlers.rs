//! HTTP handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use log::debug;
use serde::Serialize;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::artifacts::Artifact;
use crate::stream::{ChatEvent, Message, SubscriberStream, sse_response};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub subscribers: usize,
}

/// Acknowledgement returned for every accepted inbound message.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.chat.hub().subscriber_count(),
    })
}

/// POST /api/chat/message
///
/// The registered handler runs before the response is sent. Its outcome does
/// not change the response.
pub async fn receive_message(
    State(state): State<AppState>,
    payload: Result<Json<Message>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(message) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    debug!(
        "Inbound {} message ({} chars)",
        message.role,
        message.content.len()
    );

    state.chat.dispatch(message).await;
    Ok(Json(StatusResponse { status: "ok" }))
}

/// GET /api/chat/stream
///
/// Replays the current layout and artifacts, then forwards live events until
/// the client disconnects.
pub async fn stream(State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.chat.hub().clone();
    let subscriber = hub.register_with_replay(state.chat.replay());
    sse_response(SubscriberStream::new(hub, subscriber))
}

/// GET /api/layout
pub async fn get_layout(State(state): State<AppState>) -> Json<ChatEvent> {
    Json(state.chat.layout().get_update_message())
}

/// GET /api/artifacts
pub async fn list_artifacts(State(state): State<AppState>) -> Json<Vec<Artifact>> {
    Json(state.chat.artifacts().all())
}

/// GET /api/artifacts/{id}
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Artifact>> {
    state
        .chat
        .artifacts()
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("artifact {id}")))
}
