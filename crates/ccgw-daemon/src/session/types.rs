//! Session types shared by the real and mock launchers.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// What to ask the CLI for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Claude session to resume, passed through as `--resume`.
    pub resume_session: Option<String>,
}

impl LaunchRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Configuration for spawning Claude sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path to the `claude` binary.
    pub claude_bin: PathBuf,
    /// Directory the CLI is started in.
    pub working_dir: PathBuf,
    /// Maximum wait for the next output record.
    pub output_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub terminate_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            claude_bin: PathBuf::from("claude"),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            output_timeout: Duration::from_secs(300),
            terminate_timeout: Duration::from_secs(5),
        }
    }
}

/// Session identity: the caller-supplied id until the process reports its
/// own, which is adopted at most once.
#[derive(Debug)]
pub struct SessionIdentity {
    initial: String,
    adopted: OnceLock<String>,
}

impl SessionIdentity {
    pub const fn new(initial: String) -> Self {
        Self {
            initial,
            adopted: OnceLock::new(),
        }
    }

    /// Id the session was registered under.
    pub fn initial(&self) -> &str {
        &self.initial
    }

    /// Current identity.
    pub fn current(&self) -> &str {
        self.adopted.get().map_or(&self.initial, String::as_str)
    }

    /// Adopt `reported` if no id has been adopted yet. Returns whether this
    /// call changed the identity.
    pub fn adopt(&self, reported: &str) -> bool {
        self.adopted.set(reported.to_string()).is_ok()
    }
}

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Maximum concurrent sessions ({max}) reached")]
    CapacityExceeded { max: usize },

    #[error("Session already exists: {id}")]
    DuplicateSession { id: String },

    #[error("Claude binary unavailable: {reason}")]
    BinaryUnavailable { reason: String },

    #[error("Failed to start Claude process: {reason}")]
    StartFailure { reason: String },
}

impl From<ccgw_core::Error> for SessionError {
    fn from(err: ccgw_core::Error) -> Self {
        match err {
            ccgw_core::Error::InvalidPath(reason) => Self::InvalidPath(reason),
            other => Self::StartFailure {
                reason: other.to_string(),
            },
        }
    }
}
