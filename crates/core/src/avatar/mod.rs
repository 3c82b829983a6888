//! Real-time avatar rendering
//!
//! [`AvatarProcessor`] turns speech audio into paced, lip-synced audio and
//! video frames through three threaded stages; [`AvatarHandler`] plugs it
//! into a chat session as the `avatar` handler type.
//!
//! - [`SpeechAudioSlicer`]: cuts and resamples speech into fixed slices
//! - [`VideoAudioAligner`]: keeps a speech's audio as long as its video
//! - [`SpeedLimiter`]: keeps stage 1 just ahead of real time
//! - [`BgFrameCounter`]: cycles idle background frames
//! - [`CircuitBreaker`]: isolates a failing algorithm stage

pub mod aligner;
pub mod algorithm;
pub mod bg_frame_counter;
pub mod circuit_breaker;
pub mod handler;
pub mod model;
pub mod output;
pub mod processor;
pub mod resample;
pub mod sample;
pub mod slicer;
pub mod speed_limiter;

pub use aligner::VideoAudioAligner;
pub use algorithm::{create_algorithm, AvatarAlgorithm};
pub use bg_frame_counter::BgFrameCounter;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use handler::{AvatarHandler, AvatarHandlerConfig, META_SPEECH_END, META_SPEECH_ID};
pub use model::{
    AudioFrame, AudioResult, AudioSlice, AvatarAlgoConfig, AvatarInitOption, AvatarStatus,
    MouthResult, SignalData, SignalResult, SpeechAudio, VideoFrame, VideoResult,
};
pub use output::{AvatarOutputEvent, AvatarOutputHandler, ChannelOutputHandler};
pub use processor::AvatarProcessor;
pub use sample::SampleAlgorithm;
pub use slicer::{GeneralSlicer, SpeechAudioSlicer};
pub use speed_limiter::SpeedLimiter;
