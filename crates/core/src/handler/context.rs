//! Per-session handler runtime context

use std::any::Any;
use std::fmt;

use crate::session::DataSubmitter;
use crate::{Error, Result};

use super::contract::{HandlerResult, HandlerState};

/// Runtime context owned by one handler within one session
pub struct HandlerContext {
    session_id: String,
    owner: String,
    submitter: Option<DataSubmitter>,
    state: HandlerState,
}

impl HandlerContext {
    pub fn new(session_id: impl Into<String>, owner: impl Into<String>, state: HandlerState) -> Self {
        Self {
            session_id: session_id.into(),
            owner: owner.into(),
            submitter: None,
            state,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Name of the handler owning this context
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub(crate) fn set_submitter(&mut self, submitter: DataSubmitter) {
        self.submitter = Some(submitter);
    }

    /// Submitter for results produced outside `handle`, available once started
    pub fn submitter(&self) -> Option<&DataSubmitter> {
        self.submitter.as_ref()
    }

    /// Emit a result asynchronously through the session
    pub fn submit(&self, result: HandlerResult) -> Result<()> {
        match &self.submitter {
            Some(submitter) => submitter.submit(result),
            None => Err(Error::InvalidState(format!(
                "handler {} submitted data before session {} started",
                self.owner, self.session_id
            ))),
        }
    }

    pub fn state<T: Any>(&self) -> Result<&T> {
        self.state.downcast_ref::<T>().ok_or_else(|| self.state_mismatch::<T>())
    }

    pub fn state_mut<T: Any>(&mut self) -> Result<&mut T> {
        if !self.state.is::<T>() {
            return Err(self.state_mismatch::<T>());
        }
        self.state
            .downcast_mut::<T>()
            .ok_or_else(|| Error::InvalidState("handler state changed type".to_string()))
    }

    pub fn into_state(self) -> HandlerState {
        self.state
    }

    fn state_mismatch<T: Any>(&self) -> Error {
        Error::InvalidState(format!(
            "handler {} context is not a {}",
            self.owner,
            std::any::type_name::<T>()
        ))
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("session_id", &self.session_id)
            .field("owner", &self.owner)
            .field("started", &self.submitter.is_some())
            .finish()
    }
}
