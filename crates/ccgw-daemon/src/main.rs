//! ccgw Daemon
//!
//! Serves an OpenAI-compatible chat completions API backed by Claude Code
//! subprocesses.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use ccgw_core::config::{Config, load_config};
use ccgw_daemon::server::{HttpServer, ServerConfig};
use ccgw_daemon::session::{
    ClaudeLauncher, MockLauncher, SessionConfig, SessionLauncher, SessionRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "ccgw-daemon")]
#[command(version, about = "ccgw daemon - OpenAI-compatible gateway for Claude Code")]
struct Args {
    /// Settings file (JSON). Defaults to the global settings file if present.
    #[arg(long, env = "CCGW_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `claude` CLI binary
    #[arg(long)]
    claude_bin: Option<PathBuf>,

    /// Maximum concurrent Claude sessions
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Directory holding per-project working directories
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    /// Answer with canned responses instead of running `claude`.
    #[arg(long)]
    mock: bool,

    /// Seconds to wait for the next output line before ending a response.
    #[arg(long)]
    streaming_timeout: Option<u64>,

    /// Seconds to wait for graceful subprocess shutdown before SIGKILL.
    #[arg(long)]
    terminate_timeout: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.daemon.host = host;
        }
        if let Some(port) = self.port {
            config.daemon.port = port;
        }
        if let Some(bin) = self.claude_bin {
            config.claude.binary_path = Some(bin);
        }
        if let Some(max) = self.max_sessions {
            config.claude.max_concurrent_sessions = max;
        }
        if let Some(root) = self.project_root {
            config.projects.root = root;
        }
        if let Some(level) = self.log_level {
            config.daemon.log_level = level;
        }
        if let Some(secs) = self.streaming_timeout {
            config.streaming.timeout_secs = secs;
        }
        if let Some(secs) = self.terminate_timeout {
            config.claude.terminate_timeout_secs = secs;
        }
        config.daemon.log_json |= self.log_json;
        config.claude.mock |= self.mock;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    let log_filter =
        ccgw_core::tracing_init::default_filter("ccgw_daemon", &config.daemon.log_level);
    ccgw_core::tracing_init::init_tracing(&log_filter, config.daemon.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.daemon.host,
        port = config.daemon.port,
        max_sessions = config.claude.max_concurrent_sessions,
        mock = config.claude.mock,
        "Starting ccgw-daemon"
    );

    let output_timeout = Duration::from_secs(config.streaming.timeout_secs);
    let launcher: Arc<dyn SessionLauncher> = if config.claude.mock {
        warn!("Mock mode enabled, Claude CLI will not be invoked");
        Arc::new(MockLauncher::new(
            config.claude.default_model.clone(),
            output_timeout,
        ))
    } else {
        let session_config = SessionConfig {
            claude_bin: config.claude.resolved_binary(),
            working_dir: resolve_working_dir(config.claude.working_dir.as_deref()),
            output_timeout,
            terminate_timeout: Duration::from_secs(config.claude.terminate_timeout_secs),
        };
        info!(
            claude_bin = %session_config.claude_bin.display(),
            working_dir = %session_config.working_dir.display(),
            "Using Claude CLI"
        );
        Arc::new(ClaudeLauncher::new(session_config))
    };

    std::fs::create_dir_all(&config.projects.root)?;
    let project_root = std::fs::canonicalize(&config.projects.root)?;
    info!(project_root = %project_root.display(), "Project root ready");

    let registry = Arc::new(SessionRegistry::new(
        launcher,
        project_root,
        config.claude.max_concurrent_sessions,
        config.claude.default_model.clone(),
    ));

    match registry.get_version().await {
        Ok(version) => info!(claude_version = %version, "Claude CLI available"),
        Err(e) => error!(error = %e, "Claude CLI unavailable, serving in degraded mode"),
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let session_timeout = Duration::from_secs(config.claude.session_timeout_minutes.max(1) * 60);
    let reap_interval = Duration::from_secs(config.claude.cleanup_interval_minutes.max(1) * 60)
        .min(session_timeout);
    let reaper = registry.spawn_reaper(reap_interval, session_timeout, shutdown_rx.clone());

    let server = HttpServer::new(ServerConfig::from_config(&config), Arc::clone(&registry));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let mut server_shutdown_rx = shutdown_rx;
    let mut server_handle = tokio::spawn(server.serve(async move {
        let _ = server_shutdown_rx.changed().await;
    }));

    // Notify systemd that the daemon is ready to serve (unix only).
    // The `true` parameter unsets $NOTIFY_SOCKET so child processes
    // (Claude Code subprocesses) don't accidentally notify systemd.
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    let server_result = tokio::select! {
        result = &mut server_handle => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
            None
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
            None
        }
    };

    let _ = shutdown_tx.send(true);
    // Ending the sessions ends their response streams, letting open
    // connections drain.
    registry.cleanup_all().await;

    let server_result = match server_result {
        Some(result) => result,
        None => server_handle.await,
    };
    let server_failed = match server_result {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server failed");
            true
        }
        Err(e) => {
            error!(error = %e, "HTTP server task panicked");
            true
        }
    };
    let _ = reaper.await;

    info!("Daemon stopped");
    if server_failed {
        anyhow::bail!("HTTP server exited with an error");
    }
    Ok(())
}

/// Configured working directory, falling back to the current directory and
/// then the home directory when it is missing.
fn resolve_working_dir(configured: Option<&std::path::Path>) -> PathBuf {
    if let Some(dir) = configured {
        if dir.is_dir() {
            return dir.to_path_buf();
        }
        warn!(
            requested = %dir.display(),
            "Working directory missing, using fallback"
        );
    }
    std::env::current_dir().unwrap_or_else(|_| {
        dirs::home_dir().unwrap_or_else(|| {
            warn!("dirs::home_dir() returned None; falling back to temp_dir for working directory");
            std::env::temp_dir()
        })
    })
}
