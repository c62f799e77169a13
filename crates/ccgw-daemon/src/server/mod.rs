//! OpenAI-compatible HTTP server.

mod chat;
mod config;
mod error;
mod health;
mod models;
mod sessions;

pub use config::ServerConfig;
pub use error::ApiError;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::session::SessionRegistry;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, config: ServerConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }
}

/// CORS policy for the configured origins. `"*"` allows any origin; an
/// empty list allows none.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        cors.allow_origin(AllowOrigin::predicate(|_, _| false))
    } else {
        cors.allow_origin(origins)
    }
}

/// All routes with tracing and CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/models", get(models::list_models))
        .route("/v1/models/{id}", get(models::get_model))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/{id}", delete(sessions::stop_session))
        .route("/v1/sessions/{id}/input", post(sessions::send_input))
        .route("/v1/projects/{id}", delete(sessions::delete_project))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTTP server handle.
pub struct HttpServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
}

impl HttpServer {
    pub const fn new(config: ServerConfig, registry: Arc<SessionRegistry>) -> Self {
        Self { config, registry }
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::Config(format!("failed to bind {bind_addr}: {e}"))
        })?;
        let addr = listener.local_addr()?;

        info!(%addr, "Starting HTTP server");
        let app = build_router(AppState::new(self.registry, self.config));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
