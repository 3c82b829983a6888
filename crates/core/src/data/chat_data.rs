//! Message envelope routed between handlers

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::bundle::DataBundle;

/// Channel category of external inputs and outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EngineChannelType {
    None,
    Text,
    Audio,
    Video,
    Event,
    MotionData,
}

impl EngineChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineChannelType::None => "none",
            EngineChannelType::Text => "text",
            EngineChannelType::Audio => "audio",
            EngineChannelType::Video => "video",
            EngineChannelType::Event => "event",
            EngineChannelType::MotionData => "motion_data",
        }
    }

    /// Semantic type assigned to raw data arriving on this channel
    pub fn input_data_type(&self) -> Option<ChatDataType> {
        match self {
            EngineChannelType::Audio => Some(ChatDataType::MicAudio),
            EngineChannelType::Video => Some(ChatDataType::CameraVideo),
            EngineChannelType::Text => Some(ChatDataType::HumanText),
            _ => None,
        }
    }
}

impl fmt::Display for EngineChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic type of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChatDataType {
    None,
    HumanText,
    AvatarText,
    #[serde(rename = "human_vad")]
    HumanVoiceActivity,
    MicAudio,
    HumanAudio,
    AvatarAudio,
    CameraVideo,
    AvatarVideo,
    AvatarMotionData,
}

impl ChatDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatDataType::None => "none",
            ChatDataType::HumanText => "human_text",
            ChatDataType::AvatarText => "avatar_text",
            ChatDataType::HumanVoiceActivity => "human_vad",
            ChatDataType::MicAudio => "mic_audio",
            ChatDataType::HumanAudio => "human_audio",
            ChatDataType::AvatarAudio => "avatar_audio",
            ChatDataType::CameraVideo => "camera_video",
            ChatDataType::AvatarVideo => "avatar_video",
            ChatDataType::AvatarMotionData => "avatar_motion_data",
        }
    }

    pub fn channel_type(&self) -> EngineChannelType {
        match self {
            ChatDataType::None => EngineChannelType::None,
            ChatDataType::HumanText | ChatDataType::AvatarText => EngineChannelType::Text,
            ChatDataType::HumanVoiceActivity => EngineChannelType::Event,
            ChatDataType::MicAudio | ChatDataType::HumanAudio | ChatDataType::AvatarAudio => {
                EngineChannelType::Audio
            }
            ChatDataType::CameraVideo | ChatDataType::AvatarVideo => EngineChannelType::Video,
            ChatDataType::AvatarMotionData => EngineChannelType::MotionData,
        }
    }
}

impl fmt::Display for ChatDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rational timestamp: `ticks / base` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub ticks: i64,
    pub base: i64,
}

impl Timestamp {
    pub const INVALID: Timestamp = Timestamp { ticks: -1, base: -1 };

    pub fn new(ticks: i64, base: i64) -> Self {
        Self { ticks, base }
    }

    pub fn is_valid(&self) -> bool {
        self.ticks >= 0 && self.base > 0
    }

    pub fn as_secs_f64(&self) -> Option<f64> {
        self.is_valid()
            .then(|| self.ticks as f64 / self.base as f64)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::INVALID
    }
}

/// Typed envelope: producer, semantic type, timestamp and payload
///
/// The payload is shared; cloning an envelope for several subscribers does
/// not copy array data.
#[derive(Debug, Clone)]
pub struct ChatData {
    pub source: String,
    pub data_type: ChatDataType,
    pub timestamp: Timestamp,
    pub data: Arc<DataBundle>,
}

impl ChatData {
    pub fn new(data_type: ChatDataType, data: DataBundle) -> Self {
        Self {
            source: String::new(),
            data_type,
            timestamp: Timestamp::INVALID,
            data: Arc::new(data),
        }
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_timestamp_valid(&self) -> bool {
        self.timestamp.is_valid()
    }

    pub fn channel_type(&self) -> EngineChannelType {
        self.data_type.channel_type()
    }
}

impl fmt::Display for ChatData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChatData(source={}, type={}, ts={}/{}) {}",
            self.source, self.data_type, self.timestamp.ticks, self.timestamp.base, self.data
        )
    }
}
