//! Claude Code subprocess session.
//!
//! Spawns one CLI invocation in `stream-json` mode, reads stdout into the
//! session's output queue and stderr into the log, and guarantees teardown
//! on every exit path.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ccgw_core::EventRecord;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::output::{EventStream, OutputQueue, OutputSender, output_channel};
use super::types::{LaunchRequest, SessionConfig, SessionError, SessionIdentity};
use super::{AgentSession, SessionLauncher};

/// Upper bound for `claude --version`.
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the CLI argument list (without the binary itself).
pub fn build_args(request: &LaunchRequest) -> Vec<String> {
    let mut args = vec!["-p".to_string(), request.prompt.clone()];

    if let Some(ref system_prompt) = request.system_prompt {
        args.push("--system-prompt".to_string());
        args.push(system_prompt.clone());
    }
    if let Some(ref model) = request.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }

    args.extend(
        [
            "--output-format",
            "stream-json",
            "--verbose",
            "--dangerously-skip-permissions",
        ]
        .map(String::from),
    );

    if let Some(ref session) = request.resume_session {
        args.push("--resume".to_string());
        args.push(session.clone());
    }

    args
}

/// One Claude CLI invocation.
pub struct ProcessSession {
    identity: Arc<SessionIdentity>,
    project_path: PathBuf,
    config: SessionConfig,
    running: Arc<AtomicBool>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    readers: Mutex<JoinSet<()>>,
    stop_tx: watch::Sender<bool>,
    sender: OutputSender,
    output: OutputQueue,
    started_at: Instant,
}

impl ProcessSession {
    pub fn new(session_id: String, project_path: PathBuf, config: SessionConfig) -> Self {
        let (sender, output) = output_channel(config.output_timeout);
        let (stop_tx, _) = watch::channel(false);
        Self {
            identity: Arc::new(SessionIdentity::new(session_id)),
            project_path,
            config,
            running: Arc::new(AtomicBool::new(false)),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            readers: Mutex::new(JoinSet::new()),
            stop_tx,
            sender,
            output,
            started_at: Instant::now(),
        }
    }

    /// Spawn the CLI and start the stdout/stderr readers.
    pub async fn start(&self, request: &LaunchRequest) -> Result<(), SessionError> {
        let mut child_slot = self.child.lock().await;
        if child_slot.is_some() || self.sender.is_finished() {
            return Err(SessionError::StartFailure {
                reason: "session already started".to_string(),
            });
        }

        let mut cmd = Command::new(&self.config.claude_bin);
        cmd.args(build_args(request))
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Ensure essential env vars are available to the subprocess even
        // when running under systemd with stripped environment.
        for key in ["HOME", "PATH", "ANTHROPIC_API_KEY"] {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }

        info!(
            session_id = %self.identity.current(),
            project_path = %self.project_path.display(),
            working_dir = %self.config.working_dir.display(),
            model = ?request.model,
            resume_session = ?request.resume_session,
            "Starting Claude process"
        );

        let mut child = cmd.spawn().map_err(|e| {
            error!(
                session_id = %self.identity.current(),
                claude_bin = %self.config.claude_bin.display(),
                error = %e,
                "Failed to start Claude process"
            );
            SessionError::StartFailure {
                reason: format!("{}: {e}", self.config.claude_bin.display()),
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        self.running.store(true, Ordering::SeqCst);
        *self.stdin.lock().await = Some(stdin);

        let mut readers = self.readers.lock().await;
        readers.spawn(read_stdout(
            stdout,
            Arc::clone(&self.identity),
            self.sender.clone(),
            Arc::clone(&self.running),
            self.stop_tx.subscribe(),
        ));
        readers.spawn(read_stderr(
            stderr,
            Arc::clone(&self.identity),
            Arc::clone(&self.running),
            self.stop_tx.subscribe(),
        ));
        drop(readers);

        debug!(session_id = %self.identity.current(), pid = ?child.id(), "Claude process spawned");
        *child_slot = Some(child);
        Ok(())
    }
}

fn missing_pipe(name: &str) -> SessionError {
    SessionError::StartFailure {
        reason: format!("Failed to capture {name}"),
    }
}

#[async_trait]
impl AgentSession for ProcessSession {
    fn session_id(&self) -> String {
        self.identity.current().to_string()
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
        self.output.take_stream(self.session_id()).await
    }

    async fn send_input(&self, text: &str) {
        if !self.is_running() {
            debug!(session_id = %self.identity.current(), "Input ignored, session not running");
            return;
        }

        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            debug!(session_id = %self.identity.current(), "Input ignored, stdin closed");
            return;
        };

        let result: std::io::Result<()> = async {
            stdin.write_all(text.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = result {
            error!(session_id = %self.identity.current(), error = %e, "Error sending input");
        }
    }

    async fn stop(&self) {
        let session_id = self.session_id();
        self.running.store(false, Ordering::SeqCst);
        self.stop_tx.send_replace(true);

        drop(self.stdin.lock().await.take());

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            terminate(&mut child, self.config.terminate_timeout, &session_id).await;
        }

        let mut readers = self.readers.lock().await;
        while let Some(joined) = readers.join_next().await {
            if let Err(e) = joined {
                warn!(session_id, error = %e, "Reader task failed");
            }
        }
        drop(readers);

        // Covers a session that never got as far as spawning its readers.
        self.sender.finish();

        info!(session_id, "Claude process stopped");
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
async fn terminate(child: &mut Child, grace: Duration, session_id: &str) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid is a valid process ID obtained from our own Child handle.
            // kill(2) with SIGTERM is safe to call on any owned subprocess.
            #[allow(unsafe_code)]
            #[allow(clippy::cast_possible_wrap)]
            let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                warn!(session_id, pid, error = %err, "Failed to send SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            warn!(session_id, error = %e, "Failed to request termination");
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(session_id, ?status, "Process exited gracefully");
        }
        Ok(Err(e)) => {
            error!(session_id, error = %e, "Error stopping process");
            if let Err(e) = child.kill().await {
                error!(session_id, error = %e, "Failed to kill process");
            }
        }
        Err(_) => {
            warn!(session_id, "Timeout waiting for graceful shutdown, killing");
            if let Err(e) = child.kill().await {
                error!(session_id, error = %e, "Failed to kill process");
            }
        }
    }
}

async fn read_stdout(
    stdout: ChildStdout,
    identity: Arc<SessionIdentity>,
    sender: OutputSender,
    running: Arc<AtomicBool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stdout).lines();

    while running.load(Ordering::SeqCst) {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = stop_rx.changed() => break,
        };

        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let record = EventRecord::from_line(&line);
                if let Some(reported) = record.session_id()
                    && identity.adopt(reported)
                {
                    info!(
                        session_id = reported,
                        initial_session_id = identity.initial(),
                        "Adopted Claude session ID"
                    );
                }
                sender.push(record);
            }
            Ok(None) => break,
            Err(e) => {
                error!(session_id = %identity.current(), error = %e, "Error reading output");
                break;
            }
        }
    }

    sender.finish();
    running.store(false, Ordering::SeqCst);
    info!(session_id = %identity.current(), "Claude process output stream ended");
}

async fn read_stderr(
    stderr: ChildStderr,
    identity: Arc<SessionIdentity>,
    running: Arc<AtomicBool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stderr).lines();

    while running.load(Ordering::SeqCst) {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = stop_rx.changed() => break,
        };

        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    warn!(session_id = %identity.current(), message = line, "Claude stderr");
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(session_id = %identity.current(), error = %e, "Error reading stderr");
                break;
            }
        }
    }
    debug!(session_id = %identity.current(), "stderr reader finished");
}

/// Run `<bin> --version` and return its trimmed stdout.
pub async fn probe_version(claude_bin: &Path) -> Result<String, SessionError> {
    let output = tokio::time::timeout(
        VERSION_TIMEOUT,
        Command::new(claude_bin)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| SessionError::BinaryUnavailable {
        reason: format!("{} --version timed out", claude_bin.display()),
    })?
    .map_err(|e| SessionError::BinaryUnavailable {
        reason: if e.kind() == std::io::ErrorKind::NotFound {
            format!("Claude binary not found at: {}", claude_bin.display())
        } else {
            format!("Failed to run {}: {e}", claude_bin.display())
        },
    })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(SessionError::BinaryUnavailable {
            reason: format!(
                "Claude version check failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        })
    }
}

/// Launches real `claude` subprocesses.
#[derive(Debug, Clone)]
pub struct ClaudeLauncher {
    config: SessionConfig,
}

impl ClaudeLauncher {
    pub const fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionLauncher for ClaudeLauncher {
    async fn launch(
        &self,
        session_id: String,
        project_path: PathBuf,
        request: LaunchRequest,
    ) -> Result<Arc<dyn AgentSession>, SessionError> {
        let session = Arc::new(ProcessSession::new(
            session_id,
            project_path,
            self.config.clone(),
        ));
        session.start(&request).await?;
        Ok(session)
    }

    async fn version(&self) -> Result<String, SessionError> {
        probe_version(&self.config.claude_bin).await
    }
}
