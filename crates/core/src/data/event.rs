//! Session events carried alongside bundle payloads

use serde::{Deserialize, Serialize};

/// Kind of session event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StartAvatarSpeaking,
    EndAvatarSpeaking,
    StartHumanSpeaking,
    EndHumanSpeaking,
    #[serde(rename = "human_speech_text")]
    HumanText,
    #[serde(rename = "human_speech_text_end")]
    HumanTextEnd,
    #[serde(rename = "avatar_speech_text")]
    AvatarText,
    #[serde(rename = "avatar_speech_text_end")]
    AvatarTextEnd,
    SessionStart,
    SessionStop,
    InterruptSpeech,
    ServerError,
}

/// Encoding of an event's embedded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventPayloadType {
    #[default]
    NotSet,
    Text,
    Json,
    Base64,
}

/// A single session event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event_type: EventType,
    #[serde(default)]
    pub event_subtype: Option<String>,
    #[serde(default)]
    pub payload_type: EventPayloadType,
    #[serde(default)]
    pub payload: Option<String>,
    /// Event time in `time_unit` ticks; `None` marks an instant event
    #[serde(default)]
    pub event_time: Option<i64>,
    #[serde(default)]
    pub time_unit: Option<i64>,
}

impl EventData {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            event_subtype: None,
            payload_type: EventPayloadType::NotSet,
            payload: None,
            event_time: None,
            time_unit: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.payload_type = EventPayloadType::Text;
        self.payload = Some(text.into());
        self
    }
}
