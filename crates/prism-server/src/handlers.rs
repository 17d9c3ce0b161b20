//! HTTP route handlers and websocket control-frame handling.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use prism_core::wire::{self, ControlMessage, WireEnvelope};
use prism_core::{Platform, SessionId, StartError};
use serde_json::json;

use crate::api::{AbortData, ApiResponse, PreviewData, PreviewRequest, PublishRequest};
use crate::client::{ClientId, ClientRegistry};
use crate::error::ServerError;
use crate::server::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": wire::now_iso8601(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "clients": state.client_registry.count(),
        "active_runs": state.orchestrator.active_count(),
        "platforms": Platform::ALL,
    }))
}

pub async fn config(State(state): State<AppState>) -> impl IntoResponse {
    let platforms: Vec<serde_json::Value> = Platform::ALL
        .iter()
        .map(|p| {
            json!({
                "id": p,
                "name": p.display_name(),
                "icon": p.icon(),
                "color": p.color(),
                "maxCharacters": p.max_characters(),
                "maxHashtags": p.max_hashtags(),
                "steps": p.steps().len(),
            })
        })
        .collect();
    Json(ApiResponse::ok(json!({
        "settings": &*state.settings,
        "platforms": platforms,
    })))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.as_ref().map(|m| m.snapshot()).unwrap_or_default();
    Json(ApiResponse::ok(snapshot))
}

/// Adapted text per platform, without publishing anything.
pub async fn preview_content(Json(request): Json<PreviewRequest>) -> Result<impl IntoResponse, ServerError> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(StartError::EmptyContent.into());
    }
    let platforms = parse_platforms(&request.platforms)?;
    tracing::info!(platforms = platforms.len(), "Previewing content");

    let adaptations = prism_core::ContentAdapter.adapt_all(content, &platforms);
    Ok(Json(ApiResponse::ok(PreviewData {
        original: content.to_owned(),
        adaptations,
    })))
}

/// Preview tolerates repeats; publishing does not.
fn parse_platforms(ids: &[String]) -> Result<Vec<Platform>, StartError> {
    if ids.is_empty() {
        return Err(StartError::NoPlatforms);
    }
    let mut platforms = Vec::with_capacity(ids.len());
    for id in ids {
        let platform: Platform = id.parse()?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

pub async fn publish_content(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<impl IntoResponse, ServerError> {
    match state.orchestrator.publish(request) {
        Ok(accepted) => Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(accepted)))),
        Err(e) => {
            tracing::warn!(kind = e.error_kind(), error = %e, "Publish request rejected");
            Err(e)
        }
    }
}

pub async fn abort_publish(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    if state.orchestrator.abort(&SessionId::from_raw(session_id.as_str())) {
        Ok(Json(ApiResponse::ok(AbortData {
            session_id,
            aborted: true,
        })))
    } else {
        Err(ServerError::RunNotFound(session_id))
    }
}

/// Apply one subscriber control frame and build the reply.
pub fn handle_control(registry: &ClientRegistry, client_id: &ClientId, raw: &str) -> WireEnvelope {
    match ControlMessage::parse(raw) {
        Ok(ControlMessage::JoinStream { session_id: Some(id) }) => {
            registry.join(client_id, &id);
            tracing::info!(client_id = %client_id, session_id = %id, "Client joined stream");
            WireEnvelope::new(
                wire::JOINED_STREAM,
                id.as_str(),
                json!({
                    "session_id": id,
                    "message": format!("Joined streaming session {id}"),
                }),
            )
        }
        Ok(ControlMessage::JoinStream { session_id: None }) => error_frame("session_id is required to join stream"),
        Ok(ControlMessage::LeaveStream { session_id: Some(id) }) => {
            registry.leave(client_id, &id);
            tracing::info!(client_id = %client_id, session_id = %id, "Client left stream");
            WireEnvelope::new(
                wire::LEFT_STREAM,
                id.as_str(),
                json!({
                    "session_id": id,
                    "message": format!("Left streaming session {id}"),
                }),
            )
        }
        Ok(ControlMessage::LeaveStream { session_id: None }) => error_frame("session_id is required to leave stream"),
        Err(e) => error_frame(&e.to_string()),
    }
}

fn error_frame(message: &str) -> WireEnvelope {
    WireEnvelope::new(wire::ERROR, "", json!({ "message": message }))
}
