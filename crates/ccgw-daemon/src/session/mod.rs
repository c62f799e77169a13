//! Claude session supervision.
//!
//! A session is one external CLI invocation with its output queue. The
//! [`SessionRegistry`] admits and tracks sessions; a [`SessionLauncher`]
//! decides how a session is produced (real subprocess or mock).

pub mod mock;
mod output;
pub mod process;
pub mod registry;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

pub use mock::MockLauncher;
pub use output::EventStream;
pub use process::{ClaudeLauncher, ProcessSession};
pub use registry::SessionRegistry;
pub use types::{LaunchRequest, SessionConfig, SessionError, SessionIdentity};

/// A running (or finished) Claude session.
#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Current identity, which may have been adopted from the process output.
    fn session_id(&self) -> String;

    fn project_path(&self) -> &Path;

    fn is_running(&self) -> bool;

    fn started_at(&self) -> Instant;

    /// Event records, handed out once per session.
    async fn output(&self) -> EventStream;

    /// Write a line to the session's input. Failures are logged, not returned.
    async fn send_input(&self, text: &str);

    /// Tear the session down. Idempotent and infallible.
    async fn stop(&self);
}

/// Strategy for producing sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Start a session. Returns once the session is running; never waits for
    /// it to finish.
    async fn launch(
        &self,
        session_id: String,
        project_path: PathBuf,
        request: LaunchRequest,
    ) -> Result<Arc<dyn AgentSession>, SessionError>;

    /// Version string of the backing CLI.
    async fn version(&self) -> Result<String, SessionError>;
}
