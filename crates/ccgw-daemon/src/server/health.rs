//! Health endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use tracing::warn;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub claude_version: Option<String>,
    pub active_sessions: usize,
    pub max_sessions: usize,
}

/// Reports `degraded` when the Claude CLI cannot be probed.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let claude_version = match state.registry.get_version().await {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(error = %e, "Claude version probe failed");
            None
        }
    };

    Json(HealthResponse {
        status: if claude_version.is_some() {
            "healthy"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        claude_version,
        active_sessions: state.registry.active_count().await,
        max_sessions: state.registry.capacity(),
    })
}
