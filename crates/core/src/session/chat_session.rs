//! Per-conversation dispatcher
//!
//! A [`ChatSession`] wires the declared inputs and outputs of every handler
//! into a [`RoutingTable`], then runs one thread per handler plus one
//! ingestion thread that turns raw [`InputData`] into envelopes.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──> Running ──stop()──> Stopped
//! ```
//!
//! `stop()` clears the active flag, joins the ingestion thread, joins the
//! handler threads in registration order, destroys handler contexts and
//! finally drains every queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Select};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::context::{SessionContext, SessionInfo};
use super::io::{InputData, SessionIo};
use super::router::{pack_result, DataSubmitter, Dispatcher, RoutingTable};
use crate::config::{EngineConfig, HandlerConfig};
use crate::data::{ChatData, DataBundle, EngineChannelType, Timestamp};
use crate::handler::{DataInfoMap, Handler, HandlerContext, LoadedHandler};
use crate::{Error, Result};

/// Poll interval of the session threads; bounds shutdown latency
pub const POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        }
    }
}

struct HandlerRecord {
    name: String,
    handler: Arc<dyn Handler>,
    config: HandlerConfig,
    outputs: Arc<DataInfoMap>,
    input_rx: Receiver<ChatData>,
    context: Option<HandlerContext>,
    thread: Option<JoinHandle<HandlerContext>>,
}

struct SessionInner {
    state: SessionState,
    routing: Option<RoutingTable>,
    dispatcher: Option<Arc<Dispatcher>>,
    handlers: Vec<HandlerRecord>,
    input_thread: Option<JoinHandle<()>>,
}

/// Dispatcher for one conversation
pub struct ChatSession {
    context: Arc<SessionContext>,
    io: SessionIo,
    inner: Mutex<SessionInner>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("context", &self.context)
            .field("io", &self.io)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create a session and bind the configured engine outputs to `io`
    pub fn new(info: SessionInfo, io: SessionIo, engine_config: &EngineConfig) -> Result<Self> {
        let context = Arc::new(SessionContext::new(info));
        let mut routing = RoutingTable::new();
        for (channel, source) in &engine_config.outputs {
            match io.output_sender(*channel) {
                Some(sender) => routing.add_output(&source.handler, source.data_type, sender),
                None => warn!(
                    "Session {}: no {} output queue for {}/{}",
                    context.session_id(),
                    channel,
                    source.handler,
                    source.data_type
                ),
            }
        }
        Ok(Self {
            context,
            io,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                routing: Some(routing),
                dispatcher: None,
                handlers: Vec::new(),
                input_thread: None,
            }),
        })
    }

    pub fn session_id(&self) -> &str {
        self.context.session_id()
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn io(&self) -> &SessionIo {
        &self.io
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.inner.lock().handlers.iter().map(|h| h.name.clone()).collect()
    }

    /// Create the handler's context and subscribe it to its declared inputs
    pub fn prepare_handler(&self, loaded: &LoadedHandler) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Created {
            return Err(Error::InvalidState(format!(
                "cannot add handler {} to a {} session",
                loaded.name(),
                inner.state.as_str()
            )));
        }
        let name = loaded.name().to_string();
        if inner.handlers.iter().any(|h| h.name == name) {
            return Err(Error::DuplicateHandler { name });
        }

        let state = loaded.handler.create_context(&self.context, &loaded.config)?;
        let context = HandlerContext::new(self.session_id(), &name, state);
        let detail = loaded.handler.handler_detail(&self.context, &context);

        let malformed = detail.outputs.values().find(|info| {
            info.definition
                .as_ref()
                .is_some_and(|definition| definition.main_entry().is_none())
        });
        if let Some(info) = malformed {
            let err = Error::ConfigError(format!(
                "handler {} output {} has no main entry",
                name, info.data_type
            ));
            loaded.handler.destroy_context(context);
            return Err(err);
        }

        let (input_tx, input_rx) = unbounded();
        let routing = inner
            .routing
            .as_mut()
            .ok_or_else(|| Error::InvalidState("routing table already frozen".to_string()))?;
        for info in detail.inputs.values() {
            routing.add_sink(&name, info.clone(), input_tx.clone());
        }
        debug!(
            "Session {}: handler {} prepared with {} inputs, {} outputs",
            self.session_id(),
            name,
            detail.inputs.len(),
            detail.outputs.len()
        );

        inner.handlers.push(HandlerRecord {
            name,
            handler: Arc::clone(&loaded.handler),
            config: loaded.config.clone(),
            outputs: Arc::new(detail.outputs),
            input_rx,
            context: Some(context),
            thread: None,
        });
        Ok(())
    }

    /// Start all handler threads and the ingestion thread
    ///
    /// Starting a running session does nothing; a stopped session cannot be
    /// restarted.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Running => {
                warn!("Session {}: already running, start ignored", self.session_id());
                return Ok(());
            }
            SessionState::Stopped => {
                return Err(Error::InvalidState(format!(
                    "session {} was stopped",
                    self.session_id()
                )));
            }
            SessionState::Created => {}
        }

        let mut routing = inner.routing.take().unwrap_or_default();
        routing.sort();
        let dispatcher = Arc::new(Dispatcher::new(routing, Arc::clone(&self.context)));
        inner.dispatcher = Some(Arc::clone(&dispatcher));
        inner.state = SessionState::Running;
        self.context.shared_states.set_active(true);

        if let Err(e) = self.start_handlers(&mut inner, &dispatcher) {
            error!("Session {}: start failed: {}", self.session_id(), e);
            self.shutdown(&mut inner);
            return Err(e);
        }
        self.context.clock.mark_input_start();
        info!(
            "Session {}: started with {} handlers",
            self.session_id(),
            inner.handlers.len()
        );
        Ok(())
    }

    fn start_handlers(&self, inner: &mut SessionInner, dispatcher: &Arc<Dispatcher>) -> Result<()> {
        for record in inner.handlers.iter_mut() {
            if let Some(context) = record.context.as_mut() {
                context.set_submitter(DataSubmitter::new(
                    &record.name,
                    Arc::clone(&record.outputs),
                    Arc::clone(dispatcher),
                ));
                record.handler.start_context(&self.context, context)?;
            }
        }

        for record in inner.handlers.iter_mut() {
            let Some(context) = record.context.take() else {
                continue;
            };
            let pump = HandlerPump {
                name: record.name.clone(),
                handler: Arc::clone(&record.handler),
                outputs: Arc::clone(&record.outputs),
                input_rx: record.input_rx.clone(),
                dispatcher: Arc::clone(dispatcher),
                session: Arc::clone(&self.context),
            };
            let thread = thread::Builder::new()
                .name(format!("handler-{}", record.name))
                .spawn(move || pump.run(context))?;
            record.thread = Some(thread);
        }

        let ingestion = InputPump {
            receivers: self.io.input_receivers(),
            dispatcher: Arc::clone(dispatcher),
            session: Arc::clone(&self.context),
        };
        inner.input_thread = Some(
            thread::Builder::new()
                .name(format!("input-{}", self.session_id()))
                .spawn(move || ingestion.run())?,
        );
        Ok(())
    }

    /// Stop all threads, destroy handler contexts and drain every queue
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Running => {}
            SessionState::Created => {
                inner.state = SessionState::Stopped;
                self.destroy_contexts(&mut inner);
                return Ok(());
            }
            SessionState::Stopped => return Ok(()),
        }
        self.shutdown(&mut inner);
        info!("Session {}: stopped", self.session_id());
        Ok(())
    }

    fn shutdown(&self, inner: &mut SessionInner) {
        self.context.shared_states.set_active(false);
        inner.state = SessionState::Stopped;

        if let Some(thread) = inner.input_thread.take() {
            if thread.join().is_err() {
                error!("Session {}: input thread panicked", self.session_id());
            }
        }
        for record in inner.handlers.iter_mut() {
            if let Some(thread) = record.thread.take() {
                match thread.join() {
                    Ok(context) => record.context = Some(context),
                    Err(_) => error!(
                        "Session {}: handler {} thread panicked",
                        self.session_id(),
                        record.name
                    ),
                }
            }
        }
        self.destroy_contexts(inner);

        let mut dropped = self.io.drain();
        for record in &inner.handlers {
            dropped += record.input_rx.try_iter().count();
        }
        if dropped > 0 {
            debug!("Session {}: dropped {} queued messages", self.session_id(), dropped);
        }
    }

    fn destroy_contexts(&self, inner: &mut SessionInner) {
        for record in inner.handlers.iter_mut() {
            if let Some(context) = record.context.take() {
                debug!("Session {}: destroying context of {}", self.session_id(), record.name);
                record.handler.destroy_context(context);
            }
        }
    }

    /// Route an envelope as if it were emitted inside the session
    pub fn distribute_data(&self, data: ChatData) -> Result<usize> {
        let dispatcher = self
            .inner
            .lock()
            .dispatcher
            .clone()
            .ok_or_else(|| Error::InvalidState("session not started".to_string()))?;
        Ok(dispatcher.distribute(data))
    }

    /// Messages waiting in session IO queues and handler input queues
    pub fn pending_messages(&self) -> usize {
        let inner = self.inner.lock();
        self.io.pending() + inner.handlers.iter().map(|h| h.input_rx.len()).sum::<usize>()
    }

    /// Handler threads and ingestion thread still held by the session
    pub fn live_threads(&self) -> usize {
        let inner = self.inner.lock();
        inner.input_thread.is_some() as usize
            + inner.handlers.iter().filter(|h| h.thread.is_some()).count()
    }

    /// Configuration a handler was prepared with
    pub fn handler_config(&self, name: &str) -> Option<HandlerConfig> {
        self.inner
            .lock()
            .handlers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.config.clone())
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if self.state() != SessionState::Stopped {
            let _ = self.stop();
        }
    }
}

struct HandlerPump {
    name: String,
    handler: Arc<dyn Handler>,
    outputs: Arc<DataInfoMap>,
    input_rx: Receiver<ChatData>,
    dispatcher: Arc<Dispatcher>,
    session: Arc<SessionContext>,
}

impl HandlerPump {
    fn run(self, mut context: HandlerContext) -> HandlerContext {
        debug!("Session {}: handler {} pump started", self.session.session_id(), self.name);
        while self.session.shared_states.is_active() {
            let input = match self.input_rx.recv_timeout(POLL_INTERVAL) {
                Ok(input) => input,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            self.process(&mut context, input);
        }
        debug!("Session {}: handler {} pump finished", self.session.session_id(), self.name);
        context
    }

    /// Handle one message; failures are logged and the pump keeps running
    fn process(&self, context: &mut HandlerContext, input: ChatData) {
        let data_type = input.data_type;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<usize> {
            let results = self.handler.handle(context, input, &self.outputs)?;
            let mut emitted = 0;
            for result in results {
                match pack_result(&self.name, &self.outputs, result) {
                    Ok(data) => {
                        self.dispatcher.distribute(data);
                        emitted += 1;
                    }
                    Err(e) => error!(
                        "Session {}: handler {} produced an invalid result: {}",
                        self.session.session_id(),
                        self.name,
                        e
                    ),
                }
            }
            Ok(emitted)
        }));
        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(
                "Session {}: handler {} failed on {}: {}",
                self.session.session_id(),
                self.name,
                data_type,
                e
            ),
            Err(_) => error!(
                "Session {}: handler {} panicked on {}",
                self.session.session_id(),
                self.name,
                data_type
            ),
        }
    }
}

struct InputPump {
    receivers: Vec<(EngineChannelType, Receiver<InputData>)>,
    dispatcher: Arc<Dispatcher>,
    session: Arc<SessionContext>,
}

impl InputPump {
    fn run(self) {
        let mut select = Select::new();
        for (_, receiver) in &self.receivers {
            select.recv(receiver);
        }
        while self.session.shared_states.is_active() {
            let index = match select.ready_timeout(POLL_INTERVAL) {
                Ok(index) => index,
                Err(_) => continue,
            };
            let (channel, receiver) = &self.receivers[index];
            let Ok(input) = receiver.try_recv() else {
                continue;
            };
            match pack_input(&self.session, input) {
                Ok(data) => {
                    self.dispatcher.distribute(data);
                }
                Err(e) => warn!(
                    "Session {}: dropped {} input: {}",
                    self.session.session_id(),
                    channel,
                    e
                ),
            }
        }
    }
}

/// Convert raw input into an envelope of the channel's input type
pub fn pack_input(session: &SessionContext, input: InputData) -> Result<ChatData> {
    let channel = input.channel_type();
    let data_type = channel
        .input_data_type()
        .ok_or_else(|| Error::InvalidData(format!("no input type for {} channel", channel)))?;
    let (bundle, timestamp) = match input {
        InputData::Audio {
            sample_rate,
            samples,
            timestamp,
        } => {
            let definition = session.input_audio_definition(sample_rate, 1)?;
            let mut bundle = DataBundle::new(&definition);
            bundle.set_main_data(samples.into_row()?)?;
            (bundle, timestamp)
        }
        InputData::Video {
            frame_rate,
            frame,
            timestamp,
        } => {
            let definition = session.input_video_definition(frame.shape(), frame_rate)?;
            let mut bundle = DataBundle::new(&definition);
            bundle.set_main_data(frame.with_leading_axis()?)?;
            (bundle, timestamp)
        }
        InputData::Text { text, timestamp } => {
            let definition = session.input_text_definition()?;
            let mut bundle = DataBundle::new(&definition);
            bundle.set_main_data(text)?;
            (bundle, timestamp)
        }
    };
    let timestamp = timestamp
        .filter(Timestamp::is_valid)
        .unwrap_or_else(|| session.clock.timestamp());
    Ok(ChatData::new(data_type, bundle).with_timestamp(timestamp))
}
