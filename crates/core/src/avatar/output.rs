//! Consumers of rendered frames

use crossbeam::channel::{unbounded, Receiver, Sender};

use super::model::{AudioResult, AvatarInitOption, AvatarStatus, VideoResult};

/// Receives the pipeline output
///
/// Callbacks run on the pipeline threads and must not block.
pub trait AvatarOutputHandler: Send + Sync {
    fn on_start(&self, _option: &AvatarInitOption) {}

    fn on_stop(&self) {}

    fn on_audio(&self, audio: AudioResult);

    fn on_video(&self, video: VideoResult);

    fn on_avatar_status_change(&self, _speech_id: &str, _status: AvatarStatus) {}
}

/// Everything an output handler can observe
#[derive(Debug, Clone)]
pub enum AvatarOutputEvent {
    Started(AvatarInitOption),
    Audio(AudioResult),
    Video(VideoResult),
    StatusChanged { speech_id: String, status: AvatarStatus },
    Stopped,
}

/// Forwards every callback into a channel
#[derive(Debug, Clone)]
pub struct ChannelOutputHandler {
    sender: Sender<AvatarOutputEvent>,
}

impl ChannelOutputHandler {
    pub fn new() -> (Self, Receiver<AvatarOutputEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    fn emit(&self, event: AvatarOutputEvent) {
        // receiver dropped: nobody is listening any more
        let _ = self.sender.send(event);
    }
}

impl AvatarOutputHandler for ChannelOutputHandler {
    fn on_start(&self, option: &AvatarInitOption) {
        self.emit(AvatarOutputEvent::Started(option.clone()));
    }

    fn on_stop(&self) {
        self.emit(AvatarOutputEvent::Stopped);
    }

    fn on_audio(&self, audio: AudioResult) {
        self.emit(AvatarOutputEvent::Audio(audio));
    }

    fn on_video(&self, video: VideoResult) {
        self.emit(AvatarOutputEvent::Video(video));
    }

    fn on_avatar_status_change(&self, speech_id: &str, status: AvatarStatus) {
        self.emit(AvatarOutputEvent::StatusChanged {
            speech_id: speech_id.to_string(),
            status,
        });
    }
}
