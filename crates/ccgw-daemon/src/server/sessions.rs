//! Session and project management endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::projects::cleanup_project_directory;

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub prompt: String,
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionList> {
    let sessions = state.registry.active_sessions().await;
    Json(SessionList {
        total: sessions.len(),
        sessions,
    })
}

pub async fn stop_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.registry.stop_session(&id).await;
    StatusCode::NO_CONTENT
}

pub async fn send_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<InputRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(input) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if input.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }

    if state.registry.continue_conversation(&id, &input.prompt).await {
        info!(session_id = %id, "Forwarded follow-up prompt");
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotFound(format!("Session '{id}' not found")))
    }
}

/// Remove a project directory. Sessions running in it are not stopped.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    cleanup_project_directory(state.registry.project_root(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
