//! State shared by every thread of one session

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clock::SessionClock;
use super::shared_states::SharedStates;
use crate::data::{DataBundleDefinition, DataBundleEntry, EngineChannelType, ShapeDim};
use crate::Result;

/// Identity of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
}

impl SessionInfo {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// Session identity, shared flags, clock and cached input definitions
#[derive(Debug)]
pub struct SessionContext {
    pub info: SessionInfo,
    pub shared_states: SharedStates,
    pub clock: SessionClock,
    input_definitions: Mutex<HashMap<EngineChannelType, Arc<DataBundleDefinition>>>,
}

impl SessionContext {
    pub fn new(info: SessionInfo) -> Self {
        Self {
            info,
            shared_states: SharedStates::default(),
            clock: SessionClock::new(),
            input_definitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    /// Cached definition for one channel, rebuilt when `matches` rejects it
    fn cached_definition(
        &self,
        channel: EngineChannelType,
        matches: impl Fn(&DataBundleEntry) -> bool,
        build: impl FnOnce() -> Result<DataBundleEntry>,
    ) -> Result<Arc<DataBundleDefinition>> {
        let mut definitions = self.input_definitions.lock();
        if let Some(definition) = definitions.get(&channel) {
            if definition.main_entry().map(&matches).unwrap_or(false) {
                return Ok(Arc::clone(definition));
            }
            debug!(
                "Session {}: {} input format changed, rebuilding definition",
                self.info.session_id, channel
            );
        }
        let mut definition = DataBundleDefinition::with_entry(build()?)?;
        let locked = definition.lockdown();
        definitions.insert(channel, Arc::clone(&locked));
        Ok(locked)
    }

    /// Definition for ingested audio shaped `[channels, samples]`
    pub fn input_audio_definition(
        &self,
        sample_rate: u32,
        channels: usize,
    ) -> Result<Arc<DataBundleDefinition>> {
        self.cached_definition(
            EngineChannelType::Audio,
            |entry| entry.sample_rate == sample_rate && entry.shape[0] == ShapeDim::Fixed(channels),
            || Ok(DataBundleEntry::audio("mic_audio", channels, sample_rate)),
        )
    }

    /// Definition for ingested video frames shaped `[1, ...frame_shape]`
    pub fn input_video_definition(
        &self,
        frame_shape: &[usize],
        frame_rate: u32,
    ) -> Result<Arc<DataBundleDefinition>> {
        let mut shape = vec![ShapeDim::Fixed(1)];
        shape.extend(frame_shape.iter().map(|&d| ShapeDim::Fixed(d)));
        let expected = shape.clone();
        self.cached_definition(
            EngineChannelType::Video,
            |entry| entry.sample_rate == frame_rate && entry.shape == expected,
            || DataBundleEntry::framed("camera_video", shape, 0, frame_rate, None, None),
        )
    }

    pub fn input_text_definition(&self) -> Result<Arc<DataBundleDefinition>> {
        self.cached_definition(
            EngineChannelType::Text,
            |_| true,
            || Ok(DataBundleEntry::text("human_text")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_cached_per_channel() {
        let ctx = SessionContext::new(SessionInfo::new("s"));
        let a = ctx.input_audio_definition(16000, 1).unwrap();
        let b = ctx.input_audio_definition(16000, 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_locked());

        let c = ctx.input_audio_definition(24000, 1).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.main_entry().unwrap().sample_rate, 24000);

        let v = ctx.input_video_definition(&[4, 6, 3], 30).unwrap();
        let entry = v.main_entry().unwrap();
        assert_eq!(entry.name, "camera_video");
        assert_eq!(entry.shape.len(), 4);
        assert!(Arc::ptr_eq(&v, &ctx.input_video_definition(&[4, 6, 3], 30).unwrap()));
    }
}
