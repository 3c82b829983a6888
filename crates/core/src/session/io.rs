//! External input and output queues of a session

use std::collections::HashMap;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::config::EngineConfig;
use crate::data::{ChatData, DataArray, EngineChannelType, Timestamp};
use crate::{Error, Result};

/// Raw modality data entering a session
#[derive(Debug, Clone)]
pub enum InputData {
    /// Audio samples of any shape, flattened to one channel on ingestion
    Audio {
        sample_rate: u32,
        samples: DataArray,
        timestamp: Option<Timestamp>,
    },
    /// One video frame, e.g. `[height, width, channels]`
    Video {
        frame_rate: u32,
        frame: DataArray,
        timestamp: Option<Timestamp>,
    },
    Text {
        text: String,
        timestamp: Option<Timestamp>,
    },
}

impl InputData {
    pub fn audio(sample_rate: u32, samples: impl Into<DataArray>) -> Self {
        InputData::Audio {
            sample_rate,
            samples: samples.into(),
            timestamp: None,
        }
    }

    pub fn video(frame_rate: u32, frame: impl Into<DataArray>) -> Self {
        InputData::Video {
            frame_rate,
            frame: frame.into(),
            timestamp: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        InputData::Text {
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, ts: Timestamp) -> Self {
        match &mut self {
            InputData::Audio { timestamp, .. }
            | InputData::Video { timestamp, .. }
            | InputData::Text { timestamp, .. } => *timestamp = Some(ts),
        }
        self
    }

    pub fn channel_type(&self) -> EngineChannelType {
        match self {
            InputData::Audio { .. } => EngineChannelType::Audio,
            InputData::Video { .. } => EngineChannelType::Video,
            InputData::Text { .. } => EngineChannelType::Text,
        }
    }
}

type Queue<T> = (Sender<T>, Receiver<T>);

/// Input and output queues keyed by channel
///
/// Clones share the same queues, so a transport can keep one clone while
/// the session keeps another.
#[derive(Debug, Clone, Default)]
pub struct SessionIo {
    inputs: HashMap<EngineChannelType, Queue<InputData>>,
    outputs: HashMap<EngineChannelType, Queue<ChatData>>,
}

impl SessionIo {
    pub fn new(inputs: &[EngineChannelType], outputs: &[EngineChannelType]) -> Self {
        Self {
            inputs: inputs.iter().map(|&ch| (ch, unbounded())).collect(),
            outputs: outputs.iter().map(|&ch| (ch, unbounded())).collect(),
        }
    }

    /// Audio, video and text inputs plus every configured output channel
    pub fn for_config(config: &EngineConfig) -> Self {
        let outputs: Vec<EngineChannelType> = config.outputs.keys().copied().collect();
        Self::new(
            &[
                EngineChannelType::Audio,
                EngineChannelType::Video,
                EngineChannelType::Text,
            ],
            &outputs,
        )
    }

    pub fn send_input(&self, input: InputData) -> Result<()> {
        let channel = input.channel_type();
        let (sender, _) = self
            .inputs
            .get(&channel)
            .ok_or_else(|| Error::InvalidData(format!("no {} input channel", channel)))?;
        sender
            .send(input)
            .map_err(|_| Error::InvalidState(format!("{} input channel closed", channel)))
    }

    pub fn input_sender(&self, channel: EngineChannelType) -> Option<Sender<InputData>> {
        self.inputs.get(&channel).map(|(tx, _)| tx.clone())
    }

    pub fn output_receiver(&self, channel: EngineChannelType) -> Option<Receiver<ChatData>> {
        self.outputs.get(&channel).map(|(_, rx)| rx.clone())
    }

    pub(crate) fn output_sender(&self, channel: EngineChannelType) -> Option<Sender<ChatData>> {
        self.outputs.get(&channel).map(|(tx, _)| tx.clone())
    }

    /// Input receivers sorted by channel
    pub(crate) fn input_receivers(&self) -> Vec<(EngineChannelType, Receiver<InputData>)> {
        let mut receivers: Vec<_> = self
            .inputs
            .iter()
            .map(|(ch, (_, rx))| (*ch, rx.clone()))
            .collect();
        receivers.sort_by_key(|(ch, _)| *ch);
        receivers
    }

    /// Messages waiting in any queue
    pub fn pending(&self) -> usize {
        self.inputs.values().map(|(_, rx)| rx.len()).sum::<usize>()
            + self.outputs.values().map(|(_, rx)| rx.len()).sum::<usize>()
    }

    /// Discard everything still queued; returns the number of dropped messages
    pub(crate) fn drain(&self) -> usize {
        let inputs: usize = self.inputs.values().map(|(_, rx)| rx.try_iter().count()).sum();
        let outputs: usize = self.outputs.values().map(|(_, rx)| rx.try_iter().count()).sum();
        inputs + outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_send_and_drain() {
        let io = SessionIo::new(&[EngineChannelType::Audio], &[EngineChannelType::Video]);
        io.send_input(InputData::audio(16000, Array1::<f32>::zeros(160)))
            .unwrap();
        assert!(io.send_input(InputData::text("hi")).is_err());
        assert_eq!(io.pending(), 1);
        assert_eq!(io.drain(), 1);
        assert_eq!(io.pending(), 0);
        assert!(io.output_receiver(EngineChannelType::Video).is_some());
        assert!(io.output_receiver(EngineChannelType::Audio).is_none());
    }
}
