//! Configuration resolution for ccgw.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (explicit `--config`, else ~/.config/ccgw/settings.json)
//! 3. Environment variables (`CCGW_*`, plus `CLAUDE_BINARY_PATH`)
//! 4. CLI arguments (highest priority, applied by the daemon)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete ccgw configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub projects: ProjectConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

/// HTTP listener and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    /// Origins allowed by CORS; `"*"` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_json: false,
            allowed_origins: vec![
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
        }
    }
}

/// External CLI and session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeConfig {
    /// Explicit binary path; discovered when unset.
    pub binary_path: Option<PathBuf>,
    pub default_model: String,
    pub max_concurrent_sessions: usize,
    /// Directory the CLI runs in; the daemon's current directory when unset.
    pub working_dir: Option<PathBuf>,
    /// Grace period between SIGTERM and SIGKILL.
    pub terminate_timeout_secs: u64,
    /// Sessions older than this are reaped.
    pub session_timeout_minutes: u64,
    pub cleanup_interval_minutes: u64,
    /// Serve canned responses instead of spawning the CLI.
    pub mock: bool,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            default_model: crate::models::DEFAULT_MODEL.to_string(),
            max_concurrent_sessions: 10,
            working_dir: None,
            terminate_timeout_secs: 5,
            session_timeout_minutes: 30,
            cleanup_interval_minutes: 60,
            mock: false,
        }
    }
}

impl ClaudeConfig {
    /// Binary to invoke: the configured path, else auto-discovered.
    pub fn resolved_binary(&self) -> PathBuf {
        self.binary_path.clone().unwrap_or_else(find_claude_binary)
    }
}

/// Project directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub root: PathBuf,
    /// Project used when a request names none.
    pub default_project: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("claude_projects"),
            default_project: "default".to_string(),
        }
    }
}

/// Output streaming behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Per-event wait before an idle session's output is considered finished.
    pub timeout_secs: u64,
    pub keep_alive_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            keep_alive_secs: 15,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `config_file` must exist; the global settings file is optional.
pub fn load_config(config_file: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    match config_file {
        Some(path) => merge_config(&mut config, load_config_file(path)?),
        None => {
            if let Some(global_path) = global_config_path()
                && global_path.exists()
            {
                merge_config(&mut config, load_config_file(&global_path)?);
            }
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".ccgw").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/ccgw/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("ccgw").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Locate the `claude` binary.
///
/// Order: `CLAUDE_BINARY_PATH` if it points at an existing file, `claude` on
/// `PATH`, common npm/nvm install locations, then the bare name.
pub fn find_claude_binary() -> PathBuf {
    if let Some(path) = std::env::var_os("CLAUDE_BINARY_PATH").map(PathBuf::from)
        && path.exists()
    {
        return path;
    }

    if let Some(path) = std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join("claude"))
            .find(|candidate| candidate.is_file())
    }) {
        return path;
    }

    let local = PathBuf::from("/usr/local/bin/claude");
    if local.is_file() {
        return local;
    }

    let mut node_roots = vec![PathBuf::from("/usr/local/share/nvm/versions/node")];
    if let Some(home) = std::env::var_os("HOME") {
        node_roots.push(PathBuf::from(home).join(".nvm/versions/node"));
    }
    for root in node_roots {
        if let Some(found) = newest_node_install(&root) {
            return found;
        }
    }

    PathBuf::from("claude")
}

/// `<root>/<version>/bin/claude` for the lexically greatest version present.
fn newest_node_install(root: &Path) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().join("bin").join("claude"))
        .filter(|candidate| candidate.is_file())
        .collect();
    matches.sort();
    matches.pop()
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.daemon = overlay.daemon;

    if overlay.claude.binary_path.is_some() {
        base.claude.binary_path = overlay.claude.binary_path;
    }
    if overlay.claude.working_dir.is_some() {
        base.claude.working_dir = overlay.claude.working_dir;
    }
    base.claude.default_model = overlay.claude.default_model;
    base.claude.max_concurrent_sessions = overlay.claude.max_concurrent_sessions;
    base.claude.terminate_timeout_secs = overlay.claude.terminate_timeout_secs;
    base.claude.session_timeout_minutes = overlay.claude.session_timeout_minutes;
    base.claude.cleanup_interval_minutes = overlay.claude.cleanup_interval_minutes;
    base.claude.mock = overlay.claude.mock;

    base.projects = overlay.projects;
    base.streaming = overlay.streaming;
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply environment overrides, reading variables through `lookup`.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("CCGW_HOST") {
        config.daemon.host = val;
    }
    if let Some(n) = lookup("CCGW_PORT").and_then(|v| v.parse().ok()) {
        config.daemon.port = n;
    }
    if let Some(val) = lookup("CCGW_LOG_LEVEL") {
        config.daemon.log_level = val;
    }
    if let Some(b) = lookup("CCGW_LOG_JSON").as_deref().and_then(parse_bool) {
        config.daemon.log_json = b;
    }
    if let Some(val) = lookup("CCGW_ALLOWED_ORIGINS") {
        config.daemon.allowed_origins = val
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(val) = lookup("CLAUDE_BINARY_PATH").or_else(|| lookup("CCGW_CLAUDE_BIN")) {
        config.claude.binary_path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("CCGW_DEFAULT_MODEL") {
        config.claude.default_model = val;
    }
    if let Some(n) = lookup("CCGW_MAX_CONCURRENT_SESSIONS").and_then(|v| v.parse().ok()) {
        config.claude.max_concurrent_sessions = n;
    }
    if let Some(val) = lookup("CCGW_CLAUDE_WORKDIR") {
        config.claude.working_dir = Some(PathBuf::from(val));
    }
    if let Some(b) = lookup("CCGW_MOCK").as_deref().and_then(parse_bool) {
        config.claude.mock = b;
    }
    if let Some(val) = lookup("CCGW_PROJECT_ROOT") {
        config.projects.root = PathBuf::from(val);
    }
    if let Some(n) = lookup("CCGW_STREAMING_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.streaming.timeout_secs = n;
    }
}
