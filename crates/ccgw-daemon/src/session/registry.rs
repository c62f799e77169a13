//! Session registry: admission control and lifecycle of live sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ccgw_core::path_guard::ensure_directory_within_base;
use tokio::sync::{OnceCell, RwLock, watch};
use tracing::{debug, info, warn};

use super::types::{LaunchRequest, SessionError};
use super::{AgentSession, SessionLauncher};

/// Tracks every live session, keyed by the id it was registered under.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<dyn AgentSession>>>,
    launcher: Arc<dyn SessionLauncher>,
    project_root: PathBuf,
    max_concurrent: usize,
    default_model: String,
    version: OnceCell<String>,
}

impl SessionRegistry {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        project_root: PathBuf,
        max_concurrent: usize,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            launcher,
            project_root,
            max_concurrent,
            default_model: default_model.into(),
            version: OnceCell::new(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Version of the backing CLI. Only a successful probe is cached.
    pub async fn get_version(&self) -> Result<String, SessionError> {
        self.version
            .get_or_try_init(|| self.launcher.version())
            .await
            .cloned()
    }

    /// Admit, launch and register a session.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn create_session(
        &self,
        session_id: String,
        project_path: &Path,
        mut request: LaunchRequest,
    ) -> Result<Arc<dyn AgentSession>, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_concurrent {
            warn!(
                session_id,
                active = sessions.len(),
                max = self.max_concurrent,
                "Session limit reached"
            );
            return Err(SessionError::CapacityExceeded {
                max: self.max_concurrent,
            });
        }
        if sessions.contains_key(&session_id) {
            return Err(SessionError::DuplicateSession { id: session_id });
        }

        let project_path = ensure_directory_within_base(
            &project_path.to_string_lossy(),
            &self.project_root,
            true,
        )?;

        if request.model.is_none() {
            request.model = Some(self.default_model.clone());
        }

        let session = self
            .launcher
            .launch(session_id.clone(), project_path, request)
            .await?;
        sessions.insert(session_id.clone(), Arc::clone(&session));

        info!(
            session_id,
            active = sessions.len(),
            max = self.max_concurrent,
            "Session registered"
        );
        Ok(session)
    }

    /// Look up by registration id or current identity.
    pub async fn get_session(&self, id: &str) -> Option<Arc<dyn AgentSession>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .or_else(|| sessions.values().find(|s| s.session_id() == id))
            .cloned()
    }

    /// Stop and remove a session. Unknown ids are a no-op.
    pub async fn stop_session(&self, id: &str) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let key = if sessions.contains_key(id) {
                Some(id.to_string())
            } else {
                sessions
                    .iter()
                    .find(|(_, s)| s.session_id() == id)
                    .map(|(k, _)| k.clone())
            };
            key.and_then(|k| sessions.remove(&k))
        };

        match removed {
            Some(session) => {
                session.stop().await;
                info!(session_id = id, "Session stopped");
            }
            None => debug!(session_id = id, "Stop requested for unknown session"),
        }
    }

    /// Stop every session.
    pub async fn cleanup_all(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "Stopping all sessions");
        futures::future::join_all(drained.iter().map(|(_, s)| s.stop())).await;
    }

    /// Forward a follow-up prompt. Returns `false` when the session is absent.
    pub async fn continue_conversation(&self, id: &str, prompt: &str) -> bool {
        let Some(session) = self.get_session(id).await else {
            return false;
        };
        session.send_input(prompt).await;
        true
    }

    /// Current identities of all registered sessions.
    pub async fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.session_id())
            .collect();
        ids.sort();
        ids
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub const fn capacity(&self) -> usize {
        self.max_concurrent
    }

    /// Stop and remove sessions older than `max_age`. Returns how many were
    /// reaped.
    pub async fn reap_expired(&self, max_age: Duration) -> usize {
        let expired: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            let keys: Vec<_> = sessions
                .iter()
                .filter(|(_, s)| s.started_at().elapsed() > max_age)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| sessions.remove(&k).map(|s| (k, s)))
                .collect()
        };

        for (id, session) in &expired {
            warn!(session_id = %id, "Reaping expired session");
            session.stop().await;
        }
        expired.len()
    }

    /// Run [`Self::reap_expired`] every `interval` until `shutdown` fires.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaped = registry.reap_expired(max_age).await;
                        if reaped > 0 {
                            info!(reaped, "Expired sessions cleaned up");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Session reaper stopped");
        })
    }
}
