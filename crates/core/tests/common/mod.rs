//! Shared fixtures for session integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avatarchat_core::config::{EngineConfig, HandlerConfig};
use avatarchat_core::data::{ChatData, ChatDataType, DataBundle, DataBundleDefinition, DataBundleEntry};
use avatarchat_core::handler::{
    ConsumeMode, DataInfoMap, Handler, HandlerContext, HandlerDataInfo, HandlerDetail, HandlerInfo,
    HandlerManager, HandlerOutput, HandlerResult, HandlerState,
};
use avatarchat_core::session::SessionContext;
use avatarchat_core::{Error, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};

/// A delivery observed by a recorder: receiving handler name and envelope
pub type Delivery = (String, ChatData);

pub fn text_definition() -> Arc<DataBundleDefinition> {
    let mut definition = DataBundleDefinition::with_entry(DataBundleEntry::text("text")).unwrap();
    definition.lockdown()
}

/// Text envelope of `data_type` produced by `source`
pub fn text_data(source: &str, data_type: ChatDataType, text: &str) -> ChatData {
    let mut bundle = DataBundle::new(&text_definition());
    bundle.set_main_data(text).unwrap();
    let mut data = ChatData::new(data_type, bundle);
    data.source = source.to_string();
    data
}

pub fn text_of(data: &ChatData) -> Option<String> {
    data.data
        .get_main_data()
        .and_then(|v| v.as_text())
        .map(str::to_string)
}

/// Test handler recording every delivery
///
/// Text payloads `fail` and `panic` make `handle` return an error or panic.
pub struct RecordingHandler {
    inputs: Vec<HandlerDataInfo>,
    reply: Option<ChatDataType>,
    deliveries: Sender<Delivery>,
    destroyed: Arc<AtomicUsize>,
}

impl RecordingHandler {
    pub fn new(deliveries: Sender<Delivery>) -> Self {
        Self {
            inputs: Vec::new(),
            reply: None,
            deliveries,
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn consumes(mut self, data_type: ChatDataType, priority: i32, mode: ConsumeMode) -> Self {
        self.inputs.push(
            HandlerDataInfo::new(data_type)
                .with_priority(priority)
                .with_consume_mode(mode),
        );
        self
    }

    /// Answer every input with a text envelope of `data_type`
    pub fn replies(mut self, data_type: ChatDataType) -> Self {
        self.reply = Some(data_type);
        self
    }

    pub fn destroyed_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.destroyed)
    }
}

impl Handler for RecordingHandler {
    fn info(&self) -> HandlerInfo {
        HandlerInfo::new("recorder")
    }

    fn create_context(
        &self,
        _session: &Arc<SessionContext>,
        _handler_config: &HandlerConfig,
    ) -> Result<HandlerState> {
        Ok(Box::new(()))
    }

    fn handler_detail(&self, _session: &SessionContext, _context: &HandlerContext) -> HandlerDetail {
        let mut detail = HandlerDetail::default();
        for input in &self.inputs {
            detail = detail.with_input(input.clone());
        }
        if let Some(reply) = self.reply {
            detail = detail.with_output(HandlerDataInfo::new(reply).with_definition(text_definition()));
        }
        detail
    }

    fn handle(
        &self,
        context: &mut HandlerContext,
        input: ChatData,
        outputs: &DataInfoMap,
    ) -> Result<HandlerOutput> {
        let text = text_of(&input).unwrap_or_default();
        let _ = self.deliveries.send((context.owner().to_string(), input));
        match text.as_str() {
            "fail" => return Err(Error::Execution("recorder asked to fail".to_string())),
            "panic" => panic!("recorder asked to panic"),
            _ => {}
        }
        let Some(reply) = self.reply else {
            return Ok(HandlerOutput::empty());
        };
        let definition = outputs[&reply].definition.clone().unwrap();
        let mut bundle = DataBundle::new(&definition);
        bundle.set_main_data(format!("re: {}", text))?;
        Ok(HandlerOutput::single(HandlerResult::Bundle(bundle)))
    }

    fn destroy_context(&self, _context: HandlerContext) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Manager holding the given named handlers, loaded
pub fn manager_with(handlers: Vec<(&str, Box<dyn Handler>)>) -> HandlerManager {
    let mut manager = HandlerManager::new();
    for (name, handler) in handlers {
        manager
            .add_handler(name, handler, HandlerConfig::default())
            .unwrap();
    }
    manager.load(&EngineConfig::default()).unwrap();
    manager
}

pub fn deliveries() -> (Sender<Delivery>, Receiver<Delivery>) {
    unbounded()
}

/// Collect deliveries until `count` arrived or `timeout` elapsed
pub fn collect(rx: &Receiver<Delivery>, count: usize, timeout: Duration) -> Vec<Delivery> {
    let deadline = std::time::Instant::now() + timeout;
    let mut out = Vec::new();
    while out.len() < count {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(delivery) => out.push(delivery),
            Err(_) => break,
        }
    }
    out
}
