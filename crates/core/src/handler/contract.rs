//! Handler trait and the declarations handlers exchange with a session

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{EngineConfig, HandlerConfig};
use crate::data::{ChatData, ChatDataType, DataArray, DataBundle, DataBundleDefinition};
use crate::session::SessionContext;
use crate::Result;

use super::context::HandlerContext;

/// Static description of a handler implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    /// Handler type name; the manager replaces it with the configured name
    pub name: String,
    /// Lower values load first
    pub load_priority: i32,
}

impl HandlerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            load_priority: 0,
        }
    }

    pub fn with_load_priority(mut self, load_priority: i32) -> Self {
        self.load_priority = load_priority;
        self
    }
}

/// Delivery semantics for a subscribed input type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsumeMode {
    /// Every subscriber receives the message
    #[default]
    Default,
    /// Only the highest-priority subscriber receives the message
    Once,
}

/// Declared input or output of a handler
#[derive(Debug, Clone)]
pub struct HandlerDataInfo {
    pub data_type: ChatDataType,
    /// Payload schema; required for outputs emitted as raw arrays
    pub definition: Option<Arc<DataBundleDefinition>>,
    /// Lower values are delivered first
    pub input_priority: i32,
    pub consume_mode: ConsumeMode,
}

impl HandlerDataInfo {
    pub fn new(data_type: ChatDataType) -> Self {
        Self {
            data_type,
            definition: None,
            input_priority: 0,
            consume_mode: ConsumeMode::Default,
        }
    }

    pub fn with_definition(mut self, definition: Arc<DataBundleDefinition>) -> Self {
        self.definition = Some(definition);
        self
    }

    pub fn with_priority(mut self, input_priority: i32) -> Self {
        self.input_priority = input_priority;
        self
    }

    pub fn with_consume_mode(mut self, consume_mode: ConsumeMode) -> Self {
        self.consume_mode = consume_mode;
        self
    }
}

/// Declarations keyed by semantic type
pub type DataInfoMap = HashMap<ChatDataType, HandlerDataInfo>;

/// Everything a handler consumes and produces within one session
#[derive(Debug, Clone, Default)]
pub struct HandlerDetail {
    pub inputs: DataInfoMap,
    pub outputs: DataInfoMap,
}

impl HandlerDetail {
    pub fn with_input(mut self, info: HandlerDataInfo) -> Self {
        self.inputs.insert(info.data_type, info);
        self
    }

    pub fn with_output(mut self, info: HandlerDataInfo) -> Self {
        self.outputs.insert(info.data_type, info);
        self
    }
}

/// One result produced by a handler
#[derive(Debug, Clone)]
pub enum HandlerResult {
    /// Complete envelope, routed as-is apart from source and timestamp
    Envelope(ChatData),
    /// Bare container; valid only when exactly one output type is declared
    Bundle(DataBundle),
    /// Raw array written as the main entry of a declared output's definition
    TypedRaw(ChatDataType, DataArray),
}

/// Finite, single-pass sequence of results from one `handle` call
pub struct HandlerOutput(Box<dyn Iterator<Item = HandlerResult>>);

impl HandlerOutput {
    pub fn empty() -> Self {
        Self(Box::new(std::iter::empty()))
    }

    pub fn single(result: HandlerResult) -> Self {
        Self(Box::new(std::iter::once(result)))
    }

    /// Results produced lazily as the session consumes them
    pub fn lazy<I>(results: I) -> Self
    where
        I: IntoIterator<Item = HandlerResult>,
        I::IntoIter: 'static,
    {
        Self(Box::new(results.into_iter()))
    }
}

impl From<Vec<HandlerResult>> for HandlerOutput {
    fn from(results: Vec<HandlerResult>) -> Self {
        Self::lazy(results)
    }
}

impl Iterator for HandlerOutput {
    type Item = HandlerResult;

    fn next(&mut self) -> Option<HandlerResult> {
        self.0.next()
    }
}

/// Per-session handler state created by [`Handler::create_context`]
pub type HandlerState = Box<dyn Any + Send>;

/// A processing stage that consumes and produces typed data
///
/// One instance is loaded per process and shared by every session; all
/// per-session state lives in the [`HandlerContext`].
pub trait Handler: Send + Sync {
    fn info(&self) -> HandlerInfo;

    /// One-time initialisation after construction
    fn load(&mut self, _engine_config: &EngineConfig, _handler_config: &HandlerConfig) -> Result<()> {
        Ok(())
    }

    fn create_context(
        &self,
        session: &Arc<SessionContext>,
        handler_config: &HandlerConfig,
    ) -> Result<HandlerState>;

    fn handler_detail(&self, session: &SessionContext, context: &HandlerContext) -> HandlerDetail;

    /// Called once the session is running and the submitter is attached
    fn start_context(&self, _session: &Arc<SessionContext>, _context: &mut HandlerContext) -> Result<()> {
        Ok(())
    }

    fn handle(
        &self,
        context: &mut HandlerContext,
        input: ChatData,
        outputs: &DataInfoMap,
    ) -> Result<HandlerOutput>;

    fn destroy_context(&self, _context: HandlerContext) {}
}
