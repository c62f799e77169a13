#![cfg(unix)]
#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Subprocess sessions driven by fake `claude` shell scripts.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use ccgw_core::EventRecord;
use ccgw_daemon::server::{AppState, ServerConfig, build_router};
use ccgw_daemon::session::{
    AgentSession, ClaudeLauncher, LaunchRequest, ProcessSession, SessionConfig, SessionError,
    SessionLauncher, SessionRegistry,
};

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-claude");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config(claude_bin: PathBuf, dir: &Path) -> SessionConfig {
    SessionConfig {
        claude_bin,
        working_dir: dir.to_path_buf(),
        output_timeout: Duration::from_secs(5),
        terminate_timeout: Duration::from_secs(2),
    }
}

async fn collect(session: &dyn AgentSession) -> Vec<EventRecord> {
    session.output().await.collect().await
}

fn types(records: &[EventRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.record_type().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn records_flow_in_order_and_identity_is_adopted() {
    let dir = TempDir::new().unwrap();
    let bin = write_script(
        dir.path(),
        r#"echo '{"type":"system","subtype":"init","session_id":"claude-abc","model":"m","cwd":"/","tools":[]}'
echo ''
echo '{"type":"assistant","session_id":"claude-other","message":{"content":[{"type":"text","text":"Hi"}]}}'
echo 'plain text line'
echo 'warning on stderr' >&2
echo '{"type":"result","subtype":"success","session_id":"claude-abc","result":"Hi"}'"#,
    );

    let session = ProcessSession::new("caller-1".into(), dir.path().into(), config(bin, dir.path()));
    session.start(&LaunchRequest::new("hello")).await.unwrap();

    let records = collect(&session).await;
    assert_eq!(types(&records), ["system", "assistant", "text", "result"]);
    assert_eq!(
        records[2].as_value(),
        &serde_json::json!({"type": "text", "content": "plain text line"})
    );
    assert_eq!(session.session_id(), "claude-abc");

    session.stop().await;
    assert!(!session.is_running());
}

#[tokio::test]
async fn argument_list_reaches_the_binary() {
    let dir = TempDir::new().unwrap();
    let bin = write_script(dir.path(), r#"printf '%s\n' "$@""#);

    let session = ProcessSession::new("s".into(), dir.path().into(), config(bin, dir.path()));
    let request = LaunchRequest {
        prompt: "say hi".into(),
        model: Some("claude-x".into()),
        system_prompt: Some("be brief".into()),
        resume_session: Some("prev".into()),
    };
    session.start(&request).await.unwrap();

    let args: Vec<String> = collect(&session)
        .await
        .iter()
        .map(|r| r.as_value()["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        args,
        [
            "-p",
            "say hi",
            "--system-prompt",
            "be brief",
            "--model",
            "claude-x",
            "--output-format",
            "stream-json",
            "--verbose",
            "--dangerously-skip-permissions",
            "--resume",
            "prev",
        ]
    );
    session.stop().await;
}

#[tokio::test]
async fn runs_in_configured_working_directory() {
    let dir = TempDir::new().unwrap();
    let workdir = dir.path().join("work");
    std::fs::create_dir(&workdir).unwrap();
    let bin = write_script(dir.path(), "pwd");

    let session = ProcessSession::new("s".into(), dir.path().into(), config(bin, &workdir));
    session.start(&LaunchRequest::new("x")).await.unwrap();

    let records = collect(&session).await;
    let reported = PathBuf::from(records[0].as_value()["content"].as_str().unwrap());
    assert_eq!(
        reported.canonicalize().unwrap(),
        workdir.canonicalize().unwrap()
    );
    session.stop().await;
}

#[tokio::test]
async fn input_is_written_as_a_line() {
    let dir = TempDir::new().unwrap();
    let bin = write_script(
        dir.path(),
        r#"read line
echo "{\"type\":\"text\",\"content\":\"got $line\"}""#,
    );

    let session = ProcessSession::new("s".into(), dir.path().into(), config(bin, dir.path()));
    session.start(&LaunchRequest::new("x")).await.unwrap();
    session.send_input("ping").await;

    let records = collect(&session).await;
    assert_eq!(records[0].as_value()["content"], Value::from("got ping"));
    session.stop().await;

    // Input after stop is dropped without error.
    session.send_input("late").await;
}

#[tokio::test]
async fn silent_process_ends_output_after_timeout() {
    let dir = TempDir::new().unwrap();
    let bin = write_script(dir.path(), "exec sleep 30");

    let mut cfg = config(bin, dir.path());
    cfg.output_timeout = Duration::from_millis(200);
    let session = ProcessSession::new("s".into(), dir.path().into(), cfg);
    session.start(&LaunchRequest::new("x")).await.unwrap();
    assert!(session.is_running());

    let started = Instant::now();
    assert!(collect(&session).await.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));

    session.stop().await;
    session.stop().await;
    assert!(!session.is_running());
}

#[tokio::test]
async fn stop_escalates_when_sigterm_is_ignored() {
    let dir = TempDir::new().unwrap();
    let bin = write_script(
        dir.path(),
        "trap '' TERM\necho '{\"type\":\"text\",\"content\":\"ready\"}'\nwhile true; do sleep 1; done",
    );

    let mut cfg = config(bin, dir.path());
    cfg.terminate_timeout = Duration::from_millis(300);
    let session = ProcessSession::new("s".into(), dir.path().into(), cfg);
    session.start(&LaunchRequest::new("x")).await.unwrap();

    let mut output = session.output().await;
    assert!(output.next().await.is_some());

    let started = Instant::now();
    session.stop().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!session.is_running());
    assert!(output.next().await.is_none());
}

#[tokio::test]
async fn launcher_reports_version_and_spawn_failures() {
    let dir = TempDir::new().unwrap();
    let bin = write_script(
        dir.path(),
        r#"if [ "$1" = "--version" ]; then echo " 1.0.0 (Claude Code) "; exit 0; fi
echo '{"type":"result","result":"ok"}'"#,
    );
    let launcher = ClaudeLauncher::new(config(bin, dir.path()));
    assert_eq!(launcher.version().await.unwrap(), "1.0.0 (Claude Code)");

    let session = launcher
        .launch("s".into(), dir.path().into(), LaunchRequest::new("x"))
        .await
        .unwrap();
    assert_eq!(types(&collect(session.as_ref()).await), ["result"]);
    session.stop().await;

    let other = TempDir::new().unwrap();
    let failing = write_script(other.path(), "echo broken >&2; exit 3");
    let launcher = ClaudeLauncher::new(config(failing, dir.path()));
    assert!(matches!(
        launcher.version().await,
        Err(SessionError::BinaryUnavailable { .. })
    ));
}

fn cli_registry(bin: PathBuf, dir: &Path, max_sessions: usize) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(
        Arc::new(ClaudeLauncher::new(config(bin, dir))),
        dir.canonicalize().unwrap(),
        max_sessions,
        "claude-x",
    ))
}

fn process_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

#[tokio::test]
async fn registry_finds_sessions_by_adopted_identity() {
    let dir = TempDir::new().unwrap();
    let bin = write_script(
        dir.path(),
        r#"echo '{"type":"system","subtype":"init","session_id":"claude-xyz","model":"m"}'
exec sleep 30"#,
    );
    let registry = cli_registry(bin, dir.path(), 2);

    let session = registry
        .create_session("gw-1".into(), dir.path(), LaunchRequest::new("x"))
        .await
        .unwrap();
    let mut output = session.output().await;
    assert_eq!(
        output.next().await.unwrap().record_type(),
        Some("system")
    );
    assert_eq!(session.session_id(), "claude-xyz");

    let found = registry.get_session("claude-xyz").await.unwrap();
    assert!(Arc::ptr_eq(&found, &session));
    assert!(registry.get_session("gw-1").await.is_some());
    assert_eq!(registry.active_sessions().await, ["claude-xyz"]);

    registry.stop_session("claude-xyz").await;
    assert_eq!(registry.active_count().await, 0);
    assert!(!session.is_running());
    assert!(output.next().await.is_none());
}

#[tokio::test]
async fn client_disconnect_mid_stream_stops_the_process() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("pid");
    let bin = write_script(
        dir.path(),
        &format!(
            r#"echo $$ > '{}'
echo '{{"type":"assistant","message":{{"content":[{{"type":"text","text":"partial"}}]}}}}'
exec sleep 60"#,
            pid_file.display()
        ),
    );
    let registry = cli_registry(bin, dir.path(), 2);
    let app = build_router(AppState::new(Arc::clone(&registry), ServerConfig::default()));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"stream": true, "messages": [{"role": "user", "content": "hi"}]}).to_string(),
        ))
        .unwrap();
    let resp = app.oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut body = resp.into_body().into_data_stream();
    let mut received = String::new();
    while !received.contains("partial") {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        received.push_str(&String::from_utf8_lossy(&frame));
    }
    assert_eq!(registry.active_count().await, 1);

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    assert!(process_alive(&pid));

    drop(body);

    let deadline = Instant::now() + Duration::from_secs(5);
    while (registry.active_count().await > 0 || process_alive(&pid)) && Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(registry.active_count().await, 0);
    assert!(!process_alive(&pid));
}
