//! Mock launcher for running the gateway without a `claude` binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ccgw_core::EventRecord;
use serde_json::json;
use tracing::{debug, info};

use super::output::{EventStream, OutputQueue, OutputSender, output_channel};
use super::types::{LaunchRequest, SessionError};
use super::{AgentSession, SessionLauncher};

const MOCK_OUTPUT_TOKENS: u32 = 15;

/// Canned reply text for a prompt.
pub fn mock_reply(prompt: &str) -> String {
    format!("Hello! You said: '{prompt}'. This is a mock response from Claude Code API Gateway.")
}

/// Session that answers with a single result record.
pub struct MockSession {
    session_id: String,
    project_path: PathBuf,
    running: AtomicBool,
    sender: OutputSender,
    output: OutputQueue,
    started_at: Instant,
}

impl MockSession {
    pub fn new(
        session_id: String,
        project_path: PathBuf,
        request: &LaunchRequest,
        default_model: &str,
        output_timeout: Duration,
    ) -> Self {
        let (sender, output) = output_channel(output_timeout);
        let model = request.model.as_deref().unwrap_or(default_model);
        let input_tokens = request.prompt.split_whitespace().count();

        sender.push(EventRecord::from_value(json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "session_id": session_id,
            "model": model,
            "result": mock_reply(&request.prompt),
            "duration_ms": 100,
            "num_turns": 1,
            "cost_usd": 0.001,
            "usage": {
                "input_tokens": input_tokens,
                "output_tokens": MOCK_OUTPUT_TOKENS,
            },
        })));
        sender.finish();

        Self {
            session_id,
            project_path,
            running: AtomicBool::new(true),
            sender,
            output,
            started_at: Instant::now(),
        }
    }
}

#[async_trait]
impl AgentSession for MockSession {
    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    fn project_path(&self) -> &Path {
        &self.project_path
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn started_at(&self) -> Instant {
        self.started_at
    }

    async fn output(&self) -> EventStream {
        self.output.take_stream(self.session_id.clone()).await
    }

    async fn send_input(&self, text: &str) {
        debug!(session_id = %self.session_id, len = text.len(), "Mock session ignoring input");
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.sender.finish();
        debug!(session_id = %self.session_id, "Mock session stopped");
    }
}

/// Launches [`MockSession`]s.
#[derive(Debug, Clone)]
pub struct MockLauncher {
    default_model: String,
    output_timeout: Duration,
}

impl MockLauncher {
    pub fn new(default_model: impl Into<String>, output_timeout: Duration) -> Self {
        Self {
            default_model: default_model.into(),
            output_timeout,
        }
    }
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new(ccgw_core::models::DEFAULT_MODEL, Duration::from_secs(300))
    }
}

#[async_trait]
impl SessionLauncher for MockLauncher {
    async fn launch(
        &self,
        session_id: String,
        project_path: PathBuf,
        request: LaunchRequest,
    ) -> Result<Arc<dyn AgentSession>, SessionError> {
        info!(session_id, "Starting mock Claude session");
        Ok(Arc::new(MockSession::new(
            session_id,
            project_path,
            &request,
            &self.default_model,
            self.output_timeout,
        )))
    }

    async fn version(&self) -> Result<String, SessionError> {
        Ok("mock".to_string())
    }
}
