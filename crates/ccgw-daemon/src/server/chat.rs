//! `POST /v1/chat/completions`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use ccgw_core::openai::ChatCompletionRequest;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::{ApiError, AppState};
use crate::projects::project_directory;
use crate::session::{LaunchRequest, SessionRegistry};
use crate::translate::{DONE_MARKER, build_prompt, chunk_stream, collect_completion};

/// Response header carrying the registration id of the backing session.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Stops and deregisters a session when dropped, so a finished response or a
/// disconnected client both release the session.
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session_id: Option<String>,
}

impl SessionGuard {
    const fn new(registry: Arc<SessionRegistry>, session_id: String) -> Self {
        Self {
            registry,
            session_id: Some(session_id),
        }
    }

    /// Stop the session now instead of on drop.
    async fn release(mut self) {
        if let Some(id) = self.session_id.take() {
            self.registry.stop_session(&id).await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(id) = self.session_id.take() else {
            return;
        };
        debug!(session_id = %id, "Response dropped, stopping session");
        let registry = Arc::clone(&self.registry);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { registry.stop_session(&id).await });
            }
            Err(_) => warn!(session_id = %id, "No runtime to stop session on drop"),
        }
    }
}

pub async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let prompt =
        build_prompt(&request.messages).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let model = request
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.registry.default_model().to_string());
    let project_id = request
        .project_id
        .as_deref()
        .unwrap_or(&state.config.default_project);
    let project_path = project_directory(state.registry.project_root(), project_id)?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let launch = LaunchRequest {
        prompt: prompt.prompt,
        model: Some(model.clone()),
        system_prompt: prompt.system_prompt,
        resume_session: request.session_id.filter(|s| !s.trim().is_empty()),
    };

    info!(
        session_id,
        project_id,
        model,
        stream = request.stream,
        messages = request.messages.len(),
        "Chat completion request"
    );

    let session = state
        .registry
        .create_session(session_id.clone(), &project_path, launch)
        .await?;
    let guard = SessionGuard::new(Arc::clone(&state.registry), session_id.clone());
    let events = session.output().await;
    drop(session);

    let mut response = if request.stream {
        let mut chunks = Box::pin(chunk_stream(events, model));
        let stream = async_stream::stream! {
            let _guard = guard;
            while let Some(chunk) = chunks.next().await {
                match serde_json::to_string(&chunk) {
                    Ok(json) => yield Ok::<_, Infallible>(Event::default().data(json)),
                    Err(e) => warn!(error = %e, "Failed to serialize chunk"),
                }
            }
            yield Ok(Event::default().data(DONE_MARKER));
        };
        Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(state.config.keep_alive))
            .into_response()
    } else {
        let completion = collect_completion(events, model).await;
        guard.release().await;
        Json(completion).into_response()
    };

    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    Ok(response)
}
