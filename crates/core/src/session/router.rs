//! Routing of envelopes to subscribers and session outputs

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::Sender;
use tracing::{trace, warn};

use super::context::SessionContext;
use crate::data::{ChatData, ChatDataType, DataBundle};
use crate::handler::{ConsumeMode, DataInfoMap, HandlerDataInfo, HandlerResult};
use crate::{Error, Result};

/// A handler's subscription to one data type
#[derive(Debug, Clone)]
pub struct DataSink {
    pub owner: String,
    pub info: HandlerDataInfo,
    sender: Sender<ChatData>,
}

/// Subscriber lists per type plus direct `(producer, type)` outputs
#[derive(Debug, Default)]
pub struct RoutingTable {
    sinks: HashMap<ChatDataType, Vec<DataSink>>,
    outputs: HashMap<(String, ChatDataType), Sender<ChatData>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, owner: impl Into<String>, info: HandlerDataInfo, sender: Sender<ChatData>) {
        self.sinks.entry(info.data_type).or_default().push(DataSink {
            owner: owner.into(),
            info,
            sender,
        });
    }

    pub fn add_output(&mut self, producer: impl Into<String>, data_type: ChatDataType, sender: Sender<ChatData>) {
        self.outputs.insert((producer.into(), data_type), sender);
    }

    /// Order every subscriber list by input priority, then owner name
    pub fn sort(&mut self) {
        for sinks in self.sinks.values_mut() {
            sinks.sort_by(|a, b| {
                a.info
                    .input_priority
                    .cmp(&b.info.input_priority)
                    .then_with(|| a.owner.cmp(&b.owner))
            });
        }
    }

    pub fn subscribers(&self, data_type: ChatDataType) -> &[DataSink] {
        self.sinks.get(&data_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Deliver `data` to its direct output and to its subscribers
    ///
    /// Returns the number of queues the data was pushed to.
    pub fn distribute(&self, data: &ChatData) -> usize {
        let mut delivered = 0;
        let key = (data.source.clone(), data.data_type);
        if let Some(output) = self.outputs.get(&key) {
            if output.send(data.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!("Output queue for {}/{} closed", data.source, data.data_type);
            }
        }
        delivered + self.deliver(data).len()
    }

    /// Push `data` to its subscribers, returning their owners in push order
    ///
    /// The producer never receives its own data. Delivery stops after the
    /// first `ConsumeMode::Once` subscriber that received it.
    pub fn deliver(&self, data: &ChatData) -> Vec<&str> {
        let mut receivers = Vec::new();
        for sink in self.subscribers(data.data_type) {
            if sink.owner == data.source {
                continue;
            }
            if sink.sender.send(data.clone()).is_err() {
                warn!("Input queue of handler {} closed", sink.owner);
                continue;
            }
            trace!("{} -> {} ({})", data.source, sink.owner, data.data_type);
            receivers.push(sink.owner.as_str());
            if sink.info.consume_mode == ConsumeMode::Once {
                break;
            }
        }
        receivers
    }
}

/// Stamps envelopes with the session clock and routes them
#[derive(Debug)]
pub struct Dispatcher {
    routing: RoutingTable,
    session: Arc<SessionContext>,
}

impl Dispatcher {
    pub fn new(routing: RoutingTable, session: Arc<SessionContext>) -> Self {
        Self { routing, session }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn distribute(&self, mut data: ChatData) -> usize {
        if !data.is_timestamp_valid() {
            data.timestamp = self.session.clock.timestamp();
        }
        self.routing.distribute(&data)
    }
}

/// Normalize one handler result into a routable envelope
pub fn pack_result(owner: &str, outputs: &DataInfoMap, result: HandlerResult) -> Result<ChatData> {
    let mut data = match result {
        HandlerResult::Envelope(data) => data,
        HandlerResult::Bundle(bundle) => {
            if outputs.len() != 1 {
                return Err(Error::UnsupportedOutput {
                    handler: owner.to_string(),
                    reason: format!(
                        "bare bundle needs exactly one declared output type, found {}",
                        outputs.len()
                    ),
                });
            }
            let data_type = *outputs.keys().next().ok_or_else(|| Error::UnsupportedOutput {
                handler: owner.to_string(),
                reason: "no declared output".to_string(),
            })?;
            ChatData::new(data_type, bundle)
        }
        HandlerResult::TypedRaw(data_type, array) => {
            let info = outputs.get(&data_type).ok_or_else(|| Error::UnsupportedOutput {
                handler: owner.to_string(),
                reason: format!("output type {} is not declared", data_type),
            })?;
            let definition = info.definition.as_ref().ok_or_else(|| Error::UnsupportedOutput {
                handler: owner.to_string(),
                reason: format!("output type {} has no definition", data_type),
            })?;
            let mut bundle = DataBundle::new(definition);
            bundle.set_main_data(array)?;
            ChatData::new(data_type, bundle)
        }
    };
    data.source = owner.to_string();
    Ok(data)
}

/// Emits results on behalf of one handler, outside its `handle` call
#[derive(Debug, Clone)]
pub struct DataSubmitter {
    owner: String,
    outputs: Arc<DataInfoMap>,
    dispatcher: Arc<Dispatcher>,
}

impl DataSubmitter {
    pub(crate) fn new(owner: impl Into<String>, outputs: Arc<DataInfoMap>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            owner: owner.into(),
            outputs,
            dispatcher,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn outputs(&self) -> &DataInfoMap {
        &self.outputs
    }

    /// Session this submitter delivers into
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.dispatcher.session
    }

    pub fn submit(&self, result: HandlerResult) -> Result<()> {
        if !self.dispatcher.session.shared_states.is_active() {
            return Err(Error::InvalidState(format!(
                "session {} is not running, data from {} dropped",
                self.dispatcher.session.session_id(),
                self.owner
            )));
        }
        let data = pack_result(&self.owner, &self.outputs, result)?;
        self.dispatcher.distribute(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataBundleDefinition, DataBundleEntry, Timestamp};
    use crate::session::{SessionInfo, TIMESTAMP_BASE};
    use crossbeam::channel::unbounded;
    use ndarray::Array2;

    fn text_data(source: &str, data_type: ChatDataType) -> ChatData {
        let def = Arc::new(DataBundleDefinition::with_entry(DataBundleEntry::text("text")).unwrap());
        let mut bundle = DataBundle::new(&def);
        bundle.set_main_data("hello").unwrap();
        let mut data = ChatData::new(data_type, bundle);
        data.source = source.to_string();
        data
    }

    #[test]
    fn test_no_self_delivery() {
        let mut table = RoutingTable::new();
        let (tx, rx) = unbounded();
        table.add_sink("A", HandlerDataInfo::new(ChatDataType::AvatarText), tx);
        table.sort();
        assert_eq!(table.distribute(&text_data("A", ChatDataType::AvatarText)), 0);
        assert_eq!(table.distribute(&text_data("B", ChatDataType::AvatarText)), 1);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_once_skipped_by_self_does_not_stop() {
        let mut table = RoutingTable::new();
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        table.add_sink(
            "A",
            HandlerDataInfo::new(ChatDataType::HumanText)
                .with_priority(0)
                .with_consume_mode(ConsumeMode::Once),
            tx_a,
        );
        table.add_sink("B", HandlerDataInfo::new(ChatDataType::HumanText).with_priority(1), tx_b);
        table.sort();
        table.distribute(&text_data("A", ChatDataType::HumanText));
        assert_eq!(rx_a.len(), 0);
        assert_eq!(rx_b.len(), 1);
    }

    #[test]
    fn test_equal_priority_ordered_by_owner() {
        let mut table = RoutingTable::new();
        for owner in ["zeta", "alpha", "mid"] {
            let (tx, _rx) = unbounded();
            table.add_sink(owner, HandlerDataInfo::new(ChatDataType::HumanText), tx);
        }
        table.sort();
        let owners: Vec<&str> = table
            .subscribers(ChatDataType::HumanText)
            .iter()
            .map(|s| s.owner.as_str())
            .collect();
        assert_eq!(owners, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_pack_result_variants() {
        let mut def = DataBundleDefinition::new();
        def.add_entry(DataBundleEntry::audio("avatar_audio", 1, 24000))
            .unwrap();
        let outputs: DataInfoMap = [(
            ChatDataType::AvatarAudio,
            HandlerDataInfo::new(ChatDataType::AvatarAudio).with_definition(def.lockdown()),
        )]
        .into_iter()
        .collect();

        let raw = pack_result(
            "tts",
            &outputs,
            HandlerResult::TypedRaw(ChatDataType::AvatarAudio, Array2::<f32>::zeros((1, 480)).into()),
        )
        .unwrap();
        assert_eq!(raw.source, "tts");
        assert_eq!(raw.data_type, ChatDataType::AvatarAudio);
        assert!(!raw.is_timestamp_valid());

        let bundle = DataBundle::new(outputs[&ChatDataType::AvatarAudio].definition.as_ref().unwrap());
        let packed = pack_result("tts", &outputs, HandlerResult::Bundle(bundle)).unwrap();
        assert_eq!(packed.data_type, ChatDataType::AvatarAudio);

        let undeclared = pack_result(
            "tts",
            &outputs,
            HandlerResult::TypedRaw(ChatDataType::AvatarVideo, Array2::<f32>::zeros((1, 1)).into()),
        );
        assert!(matches!(undeclared, Err(Error::UnsupportedOutput { .. })));

        let bad_shape = pack_result(
            "tts",
            &outputs,
            HandlerResult::TypedRaw(ChatDataType::AvatarAudio, Array2::<f32>::zeros((2, 480)).into()),
        );
        assert!(matches!(bad_shape, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_bare_bundle_needs_single_output() {
        let outputs: DataInfoMap = [ChatDataType::AvatarText, ChatDataType::AvatarAudio]
            .into_iter()
            .map(|t| (t, HandlerDataInfo::new(t)))
            .collect();
        let def = Arc::new(DataBundleDefinition::with_entry(DataBundleEntry::text("t")).unwrap());
        let result = pack_result("llm", &outputs, HandlerResult::Bundle(DataBundle::new(&def)));
        assert!(matches!(result, Err(Error::UnsupportedOutput { .. })));
    }

    #[test]
    fn test_dispatcher_stamps_invalid_timestamps() {
        let session = Arc::new(SessionContext::new(SessionInfo::new("s")));
        let mut table = RoutingTable::new();
        let (tx, rx) = unbounded();
        table.add_sink("B", HandlerDataInfo::new(ChatDataType::HumanText), tx);
        let dispatcher = Dispatcher::new(table, session);

        dispatcher.distribute(text_data("A", ChatDataType::HumanText));
        let stamped = rx.try_recv().unwrap();
        assert_eq!(stamped.timestamp, Timestamp::new(0, TIMESTAMP_BASE));

        let kept = text_data("A", ChatDataType::HumanText).with_timestamp(Timestamp::new(7, 1000));
        dispatcher.distribute(kept);
        assert_eq!(rx.try_recv().unwrap().timestamp, Timestamp::new(7, 1000));
    }
}
