//! Chat engine: loaded handlers and live sessions

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::handler::{HandlerManager, HandlerRegistry};
use crate::session::{ChatSession, SessionInfo, SessionIo, SessionState};
use crate::{Error, Result};

/// Owns the loaded handlers and creates sessions from them
pub struct ChatEngine {
    config: EngineConfig,
    handlers: HandlerManager,
    sessions: Mutex<HashMap<String, Arc<ChatSession>>>,
}

impl ChatEngine {
    /// Instantiate and load every enabled handler of `config`
    pub fn new(config: EngineConfig, registry: &HandlerRegistry) -> Result<Self> {
        let handlers = HandlerManager::from_config(registry, &config)?;
        Self::with_handlers(config, handlers)
    }

    /// Build an engine from a manager whose handlers may not be loaded yet
    pub fn with_handlers(config: EngineConfig, mut handlers: HandlerManager) -> Result<Self> {
        handlers.load(&config)?;
        info!(
            "Chat engine ready with {} handlers",
            handlers.handlers().len()
        );
        Ok(Self {
            config,
            handlers,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn handlers(&self) -> &HandlerManager {
        &self.handlers
    }

    /// Create a session with every loaded handler prepared
    ///
    /// An empty session id is replaced with a random one. The session is
    /// returned in the `Created` state.
    pub fn create_session(&self, mut info: SessionInfo, io: SessionIo) -> Result<Arc<ChatSession>> {
        if info.session_id.is_empty() {
            info.session_id = Uuid::new_v4().to_string();
        }
        let mut sessions = self.sessions.lock();
        prune_stopped(&mut sessions);
        if sessions.contains_key(&info.session_id) {
            return Err(Error::SessionExists {
                session_id: info.session_id,
            });
        }
        if sessions.len() >= self.config.concurrent_limit {
            return Err(Error::InvalidState(format!(
                "concurrent session limit {} reached",
                self.config.concurrent_limit
            )));
        }

        let session = ChatSession::new(info, io, &self.config)?;
        for loaded in self.handlers.handlers() {
            session.prepare_handler(loaded)?;
        }
        let session = Arc::new(session);
        sessions.insert(session.session_id().to_string(), Arc::clone(&session));
        info!("Session {} created", session.session_id());
        Ok(session)
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<ChatSession>> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Sessions not yet stopped
    pub fn session_count(&self) -> usize {
        let mut sessions = self.sessions.lock();
        prune_stopped(&mut sessions);
        sessions.len()
    }

    /// Stop a session and forget it
    pub fn stop_session(&self, session_id: &str) -> Result<()> {
        let session = self
            .sessions
            .lock()
            .remove(session_id)
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        session.stop()
    }

    /// Stop every session
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<ChatSession>> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            if let Err(e) = session.stop() {
                warn!("Session {}: stop failed: {}", session.session_id(), e);
            }
        }
    }
}

/// Forget sessions stopped directly through [`ChatSession::stop`]
fn prune_stopped(sessions: &mut HashMap<String, Arc<ChatSession>>) {
    sessions.retain(|session_id, session| {
        let stopped = session.state() == SessionState::Stopped;
        if stopped {
            debug!("Session {} was stopped, releasing its slot", session_id);
        }
        !stopped
    });
}

impl Drop for ChatEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
