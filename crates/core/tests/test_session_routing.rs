//! Integration tests for data routing inside a session
//!
//! Handlers subscribe to data types with a priority and a consume mode; the
//! session delivers each envelope in priority order and forwards configured
//! `(producer, type)` pairs to the external output queues.

mod common;

use std::time::Duration;

use crossbeam::channel::unbounded;

use avatarchat_core::config::{EngineConfig, OutputSourceConfig};
use avatarchat_core::data::{ChatDataType, EngineChannelType};
use avatarchat_core::handler::{ConsumeMode, Handler, HandlerDataInfo};
use avatarchat_core::session::{InputData, RoutingTable, SessionInfo, SessionIo};
use avatarchat_core::ChatEngine;
use common::{collect, deliveries, manager_with, text_data, text_of, RecordingHandler};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(300);

fn io() -> SessionIo {
    SessionIo::new(&[EngineChannelType::Text], &[])
}

/// **Acceptance**: Given B (priority 1, ONCE) and C (priority 2) subscribed
/// to human text, when an envelope is distributed, then only B receives it.
#[test]
fn test_once_subscriber_consumes_envelope() {
    let (tx, rx) = deliveries();
    let b = RecordingHandler::new(tx.clone()).consumes(ChatDataType::HumanText, 1, ConsumeMode::Once);
    let c = RecordingHandler::new(tx).consumes(ChatDataType::HumanText, 2, ConsumeMode::Default);
    let handlers: Vec<(&str, Box<dyn Handler>)> = vec![("B", Box::new(b)), ("C", Box::new(c))];
    let engine = ChatEngine::with_handlers(EngineConfig::default(), manager_with(handlers)).unwrap();
    let session = engine.create_session(SessionInfo::new("once"), io()).unwrap();
    session.start().unwrap();

    let delivered = session
        .distribute_data(text_data("asr", ChatDataType::HumanText, "hello"))
        .unwrap();
    assert_eq!(delivered, 1);

    let received = collect(&rx, 2, QUIET);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "B");
    assert_eq!(text_of(&received[0].1).as_deref(), Some("hello"));
    session.stop().unwrap();
}

/// **Acceptance**: Given two DEFAULT subscribers, when an envelope is
/// distributed, then both receive it, lower priority value first.
#[test]
fn test_default_subscribers_all_receive() {
    let (tx, rx) = deliveries();
    let b = RecordingHandler::new(tx.clone()).consumes(ChatDataType::HumanText, 5, ConsumeMode::Default);
    let c = RecordingHandler::new(tx).consumes(ChatDataType::HumanText, 1, ConsumeMode::Default);
    let handlers: Vec<(&str, Box<dyn Handler>)> = vec![("B", Box::new(b)), ("C", Box::new(c))];
    let engine = ChatEngine::with_handlers(EngineConfig::default(), manager_with(handlers)).unwrap();
    let session = engine.create_session(SessionInfo::new("default"), io()).unwrap();
    session.start().unwrap();

    let delivered = session
        .distribute_data(text_data("asr", ChatDataType::HumanText, "hello"))
        .unwrap();
    assert_eq!(delivered, 2);

    let mut owners: Vec<String> = collect(&rx, 2, WAIT).into_iter().map(|(o, _)| o).collect();
    owners.sort();
    assert_eq!(owners, vec!["B".to_string(), "C".to_string()]);
    session.stop().unwrap();
}

/// **Acceptance**: Given DEFAULT subscribers registered out of priority
/// order, when an envelope is delivered, then it is pushed to them in
/// ascending priority value.
#[test]
fn test_default_subscribers_pushed_in_priority_order() {
    let mut routing = RoutingTable::new();
    let mut queues = Vec::new();
    for (owner, priority) in [("B", 5), ("D", 9), ("C", 1)] {
        let (tx, rx) = unbounded();
        routing.add_sink(
            owner,
            HandlerDataInfo::new(ChatDataType::HumanText)
                .with_priority(priority)
                .with_consume_mode(ConsumeMode::Default),
            tx,
        );
        queues.push(rx);
    }
    routing.sort();

    let data = text_data("asr", ChatDataType::HumanText, "hello");
    assert_eq!(routing.deliver(&data), vec!["C", "B", "D"]);
    assert!(queues.iter().all(|rx| rx.len() == 1));
    assert_eq!(routing.distribute(&data), 3);
}

/// **Acceptance**: Given a ONCE subscriber with a priority higher than a
/// DEFAULT one, when an envelope is distributed, then both receive it
/// because delivery only stops after the ONCE subscriber.
#[test]
fn test_once_subscriber_after_default_subscriber() {
    let (tx, rx) = deliveries();
    let b = RecordingHandler::new(tx.clone()).consumes(ChatDataType::HumanText, 1, ConsumeMode::Default);
    let c = RecordingHandler::new(tx.clone()).consumes(ChatDataType::HumanText, 2, ConsumeMode::Once);
    let d = RecordingHandler::new(tx).consumes(ChatDataType::HumanText, 3, ConsumeMode::Default);
    let handlers: Vec<(&str, Box<dyn Handler>)> =
        vec![("B", Box::new(b)), ("C", Box::new(c)), ("D", Box::new(d))];
    let engine = ChatEngine::with_handlers(EngineConfig::default(), manager_with(handlers)).unwrap();
    let session = engine.create_session(SessionInfo::new("mixed"), io()).unwrap();
    session.start().unwrap();

    let delivered = session
        .distribute_data(text_data("asr", ChatDataType::HumanText, "hello"))
        .unwrap();
    assert_eq!(delivered, 2);

    let mut owners: Vec<String> = collect(&rx, 3, QUIET).into_iter().map(|(o, _)| o).collect();
    owners.sort();
    assert_eq!(owners, vec!["B".to_string(), "C".to_string()]);
    session.stop().unwrap();
}

/// **Acceptance**: Given A subscribed to its own output type, when A emits
/// that type, then A does not receive it and other subscribers do.
#[test]
fn test_producer_never_receives_own_data() {
    let (tx, rx) = deliveries();
    let a = RecordingHandler::new(tx.clone()).consumes(ChatDataType::AvatarText, 0, ConsumeMode::Default);
    let b = RecordingHandler::new(tx).consumes(ChatDataType::AvatarText, 1, ConsumeMode::Default);
    let handlers: Vec<(&str, Box<dyn Handler>)> = vec![("A", Box::new(a)), ("B", Box::new(b))];
    let engine = ChatEngine::with_handlers(EngineConfig::default(), manager_with(handlers)).unwrap();
    let session = engine.create_session(SessionInfo::new("self"), io()).unwrap();
    session.start().unwrap();

    session
        .distribute_data(text_data("A", ChatDataType::AvatarText, "answer"))
        .unwrap();
    let received = collect(&rx, 2, QUIET);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "B");
    session.stop().unwrap();
}

/// **Acceptance**: Given an output channel configured for (A, avatar text)
/// and a subscriber B of avatar text, when text input reaches A and A
/// answers, then both the output queue and B receive the answer once.
#[test]
fn test_configured_output_and_subscriber_both_receive() {
    let (tx, rx) = deliveries();
    let a = RecordingHandler::new(tx.clone())
        .consumes(ChatDataType::HumanText, 0, ConsumeMode::Default)
        .replies(ChatDataType::AvatarText);
    let b = RecordingHandler::new(tx).consumes(ChatDataType::AvatarText, 0, ConsumeMode::Default);
    let handlers: Vec<(&str, Box<dyn Handler>)> = vec![("A", Box::new(a)), ("B", Box::new(b))];

    let mut config = EngineConfig::default();
    config.outputs.insert(
        EngineChannelType::Text,
        OutputSourceConfig {
            handler: "A".to_string(),
            data_type: ChatDataType::AvatarText,
        },
    );
    let io = SessionIo::for_config(&config);
    let output = io.output_receiver(EngineChannelType::Text).unwrap();
    let engine = ChatEngine::with_handlers(config, manager_with(handlers)).unwrap();
    let session = engine.create_session(SessionInfo::new("outputs"), io.clone()).unwrap();
    session.start().unwrap();

    io.send_input(InputData::text("hello")).unwrap();

    let answer = output.recv_timeout(WAIT).unwrap();
    assert_eq!(answer.source, "A");
    assert_eq!(answer.data_type, ChatDataType::AvatarText);
    assert_eq!(text_of(&answer).as_deref(), Some("re: hello"));
    assert!(answer.is_timestamp_valid());

    let received = collect(&rx, 3, QUIET);
    let owners: Vec<&str> = received.iter().map(|(o, _)| o.as_str()).collect();
    assert_eq!(owners, vec!["A", "B"]);
    assert_eq!(received[0].1.data_type, ChatDataType::HumanText);
    assert_eq!(text_of(&received[1].1).as_deref(), Some("re: hello"));
    assert!(output.try_recv().is_err());
    session.stop().unwrap();
}

/// **Acceptance**: Given a handler that errors on one message and panics on
/// another, when a third message follows, then it is still handled and its
/// answer is routed; failed messages produce no output.
#[test]
fn test_handler_failures_are_isolated() {
    let (tx, rx) = deliveries();
    let (answers_tx, answers_rx) = deliveries();
    let worker = RecordingHandler::new(tx)
        .consumes(ChatDataType::HumanText, 0, ConsumeMode::Default)
        .replies(ChatDataType::AvatarText);
    let listener = RecordingHandler::new(answers_tx).consumes(ChatDataType::AvatarText, 0, ConsumeMode::Default);
    let handlers: Vec<(&str, Box<dyn Handler>)> =
        vec![("worker", Box::new(worker)), ("listener", Box::new(listener))];
    let engine = ChatEngine::with_handlers(EngineConfig::default(), manager_with(handlers)).unwrap();
    let session = engine.create_session(SessionInfo::new("failures"), io()).unwrap();
    session.start().unwrap();

    for text in ["fail", "panic", "ok"] {
        session
            .distribute_data(text_data("asr", ChatDataType::HumanText, text))
            .unwrap();
    }

    let handled: Vec<String> = collect(&rx, 3, WAIT)
        .iter()
        .filter_map(|(_, data)| text_of(data))
        .collect();
    assert_eq!(handled, vec!["fail", "panic", "ok"]);

    let answers = collect(&answers_rx, 3, QUIET);
    assert_eq!(answers.len(), 1);
    assert_eq!(text_of(&answers[0].1).as_deref(), Some("re: ok"));
    assert_eq!(session.live_threads(), 3);
    session.stop().unwrap();
}

/// **Acceptance**: Given a session that has not been started, when data is
/// distributed, then an invalid-state error is returned.
#[test]
fn test_distribute_requires_running_session() {
    let (tx, _rx) = deliveries();
    let b = RecordingHandler::new(tx).consumes(ChatDataType::HumanText, 0, ConsumeMode::Default);
    let handlers: Vec<(&str, Box<dyn Handler>)> = vec![("B", Box::new(b))];
    let engine = ChatEngine::with_handlers(EngineConfig::default(), manager_with(handlers)).unwrap();
    let session = engine.create_session(SessionInfo::new("idle"), io()).unwrap();

    let err = session
        .distribute_data(text_data("asr", ChatDataType::HumanText, "early"))
        .unwrap_err();
    assert!(matches!(err, avatarchat_core::Error::InvalidState(_)));
}
