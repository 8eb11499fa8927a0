//! The process-wide table of live sessions.
//!
//! [`SessionRegistry`] is created once at startup and handed to the
//! transport. It owns every [`AgentSession`], provisions their output
//! directories, and offers the id-addressed operations transports call.
//!
//! # Example
//!
//! ```ignore
//! let core = CoreLoader::new(my_factory).load()?;
//! let registry = SessionRegistry::new(core, Arc::new(LoggingEmitter), RegistryConfig::default());
//!
//! let id = SessionId::generate();
//! registry.create_session(&id)?;
//! registry.start_run(&id, RunConfig::new("Draft the release notes"))?;
//! // ...
//! registry.remove(&id).await;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{error, info, warn};

use super::agent_session::{AgentSession, RunHandle, StatusSnapshot};
use super::workspace::{FileInfo, provision_output_dir};
use crate::agent::{AgentCore, CoreInfo};
use crate::config::{RegistryConfig, RunConfig};
use crate::error::SessionError;
use crate::events::{AgentEvent, EventEmitter};
use crate::id::SessionId;

/// Owns all live sessions, keyed by [`SessionId`].
pub struct SessionRegistry {
    core: Arc<AgentCore>,
    emitter: Arc<dyn EventEmitter>,
    config: RegistryConfig,
    sessions: RwLock<HashMap<SessionId, Arc<AgentSession>>>,
}

impl SessionRegistry {
    pub fn new(
        core: Arc<AgentCore>,
        emitter: Arc<dyn EventEmitter>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            core,
            emitter,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Metadata of the loaded agent core.
    pub fn core_info(&self) -> &CoreInfo {
        self.core.info()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Return the session for `session_id`, creating an idle one on first
    /// contact. A new session gets its output directory and a `connected`
    /// event.
    pub fn get_or_create(&self, session_id: &SessionId) -> Result<Arc<AgentSession>, SessionError> {
        if let Some(session) = self.get(session_id) {
            return Ok(session);
        }

        // Provisioned outside the lock. A racing creator may waste one
        // directory; the map entry stays unique.
        let output_dir = match &self.config.output_root {
            Some(root) => Some(provision_output_dir(
                root,
                &self.core.info().version_folder(),
                session_id,
            )?),
            None => None,
        };

        let (session, created) = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            match sessions.get(session_id) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let session = AgentSession::new(
                        session_id.clone(),
                        Arc::clone(&self.core),
                        Arc::clone(&self.emitter),
                        self.config.limits.clone(),
                        output_dir,
                    );
                    sessions.insert(session_id.clone(), Arc::clone(&session));
                    (session, true)
                }
            }
        };

        if created {
            let info = self.core.info();
            info!(
                "Created session {session_id}{}",
                session
                    .output_dir()
                    .map(|d| format!(" with output dir: {}", d.display()))
                    .unwrap_or_default()
            );
            session.emit(&AgentEvent::Connected {
                session_id: session_id.clone(),
                agent_version: info.agent_version.clone(),
                api_provider: info.api_provider.clone(),
                output_dir: session
                    .output_dir()
                    .map(|p| p.to_string_lossy().into_owned()),
            });
        }
        Ok(session)
    }

    /// Alias of [`get_or_create`](Self::get_or_create) for transports.
    pub fn create_session(&self, session_id: &SessionId) -> Result<Arc<AgentSession>, SessionError> {
        self.get_or_create(session_id)
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<AgentSession>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).cloned()
    }

    fn require(&self, session_id: &SessionId) -> Result<Arc<AgentSession>, SessionError> {
        self.get(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.clone()))
    }

    pub fn start_run(
        &self,
        session_id: &SessionId,
        config: RunConfig,
    ) -> Result<RunHandle, SessionError> {
        self.require(session_id)?.start_run(config)
    }

    pub fn submit_input(&self, session_id: &SessionId, text: impl Into<String>) -> Result<(), SessionError> {
        self.require(session_id)?.submit_input(text);
        Ok(())
    }

    /// Returns whether a run was active.
    pub fn request_stop(&self, session_id: &SessionId) -> Result<bool, SessionError> {
        Ok(self.require(session_id)?.request_stop())
    }

    pub fn get_status(&self, session_id: &SessionId) -> Result<StatusSnapshot, SessionError> {
        Ok(self.require(session_id)?.status())
    }

    pub fn created_files(&self, session_id: &SessionId) -> Result<Vec<FileInfo>, SessionError> {
        Ok(self.require(session_id)?.created_files())
    }

    pub fn refresh_files(&self, session_id: &SessionId) -> Result<Vec<FileInfo>, SessionError> {
        Ok(self.require(session_id)?.refresh_files())
    }

    /// Snapshot of every session. Session handles are cloned under a short
    /// read lock; snapshots are taken after it is released.
    pub fn list_active(&self) -> Vec<StatusSnapshot> {
        let sessions: Vec<Arc<AgentSession>> = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.values().cloned().collect()
        };
        sessions.iter().map(|s| s.status()).collect()
    }

    /// Alias of [`list_active`](Self::list_active) for transports.
    pub fn list_sessions(&self) -> Vec<StatusSnapshot> {
        self.list_active()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop any active run, wait for it to release (bounded by the
    /// configured release timeout), detach, and forget the session.
    ///
    /// Returns `false` for an unknown id. No event is delivered for the id
    /// once this returns.
    pub async fn remove(&self, session_id: &SessionId) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };

        session.begin_close();
        if let Err(e) = session.shutdown(self.config.limits.release_timeout).await {
            error!("{e}");
        }
        session.detach();

        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id)
            .is_some();
        if removed {
            info!("Removed session {session_id}");
        }
        removed
    }

    /// Remove every session. Used at process shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.keys().cloned().collect()
        };
        if !ids.is_empty() {
            warn!("Shutting down {} session(s)", ids.len());
        }
        for id in ids {
            self.remove(&id).await;
        }
    }
}
