//! Records flowing between the render pipeline stages

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};

/// Per-frame expression data produced from audio
pub type SignalData = Array1<f32>;

/// `[height, width, 3]` RGB image
pub type Image = Array3<u8>;

/// Whether the avatar is currently talking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvatarStatus {
    Speaking,
    Listening,
}

impl fmt::Display for AvatarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvatarStatus::Speaking => write!(f, "SPEAKING"),
            AvatarStatus::Listening => write!(f, "LISTENING"),
        }
    }
}

/// Options the pipeline is started with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarInitOption {
    pub audio_sample_rate: u32,
    pub video_frame_rate: u32,
    pub avatar_name: String,
    pub debug: bool,
    pub enable_fast_mode: bool,
    pub use_gpu: bool,
}

impl Default for AvatarInitOption {
    fn default() -> Self {
        Self {
            audio_sample_rate: 24000,
            video_frame_rate: 25,
            avatar_name: "sample_data".to_string(),
            debug: false,
            enable_fast_mode: false,
            use_gpu: false,
        }
    }
}

/// Audio format an algorithm expects
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvatarAlgoConfig {
    pub input_audio_sample_rate: u32,
    /// Seconds of audio per slice handed to the algorithm
    pub input_audio_slice_duration: f64,
}

impl Default for AvatarAlgoConfig {
    fn default() -> Self {
        Self {
            input_audio_sample_rate: 16000,
            input_audio_slice_duration: 1.0,
        }
    }
}

/// A chunk of speech audio entering the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    pub speech_id: String,
    pub end_of_speech: bool,
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl SpeechAudio {
    pub fn new(speech_id: impl Into<String>, sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            speech_id: speech_id.into(),
            end_of_speech: false,
            sample_rate,
            samples,
        }
    }

    pub fn with_end_of_speech(mut self, end_of_speech: bool) -> Self {
        self.end_of_speech = end_of_speech;
        self
    }
}

/// One slice of speech, in playback and algorithm formats
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSlice {
    pub speech_id: String,
    pub play_audio: Vec<i16>,
    pub play_sample_rate: u32,
    /// Normalised to `[-1, 1]`
    pub algo_audio: Vec<f32>,
    pub algo_sample_rate: u32,
    pub end_of_speech: bool,
    /// Seconds of leading silence added to both audio tracks
    pub front_padding_duration: f64,
    /// Seconds of trailing silence added to the algorithm audio
    pub end_padding_duration: f64,
}

impl AudioSlice {
    /// Playback duration in seconds
    pub fn play_duration(&self) -> f64 {
        if self.play_sample_rate == 0 {
            return 0.0;
        }
        self.play_audio.len() as f64 / self.play_sample_rate as f64
    }

    /// Algorithm audio duration in seconds
    pub fn algo_duration(&self) -> f64 {
        if self.algo_sample_rate == 0 {
            return 0.0;
        }
        self.algo_audio.len() as f64 / self.algo_sample_rate as f64
    }
}

impl fmt::Display for AudioSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioSlice(speech_id={}, play={:.3}s@{}, algo={:.3}s@{}, end={}, pad={:.3}/{:.3})",
            self.speech_id,
            self.play_duration(),
            self.play_sample_rate,
            self.algo_duration(),
            self.algo_sample_rate,
            self.end_of_speech,
            self.front_padding_duration,
            self.end_padding_duration
        )
    }
}

/// Audio attached to a frame, shared by every stage that forwards it
pub type SharedSlice = Arc<AudioSlice>;

/// Stage 1 output: one per video frame
#[derive(Debug, Clone)]
pub struct SignalResult {
    pub speech_id: String,
    pub signal: SignalData,
    pub avatar_status: AvatarStatus,
    pub end_of_speech: bool,
    /// Playback audio covering this frame and the ones after it without audio
    pub audio: Option<SharedSlice>,
    /// Produced while the algorithm was unavailable
    pub is_idle: bool,
}

/// Stage 2 output
#[derive(Debug, Clone)]
pub struct MouthResult {
    pub speech_id: String,
    pub mouth_image: Image,
    pub bg_frame_id: usize,
    pub avatar_status: AvatarStatus,
    pub end_of_speech: bool,
    pub audio: Option<SharedSlice>,
}

/// Composed frame with its presentation counter
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub image: Image,
    /// Frame counter, advanced by one per frame
    pub pts: u64,
    pub fps: u32,
}

impl VideoFrame {
    pub fn height(&self) -> usize {
        self.image.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.image.shape()[1]
    }
}

/// Mono 16-bit audio with its presentation counter
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    /// Sample counter, advanced by the number of samples delivered
    pub pts: u64,
    pub sample_rate: u32,
}

impl AudioFrame {
    /// PCM bytes in native byte order
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.samples)
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Stage 3 video output
#[derive(Debug, Clone)]
pub struct VideoResult {
    pub speech_id: String,
    pub frame: VideoFrame,
    pub avatar_status: AvatarStatus,
    pub end_of_speech: bool,
}

/// Stage 3 audio output
#[derive(Debug, Clone)]
pub struct AudioResult {
    pub speech_id: String,
    pub frame: AudioFrame,
    pub end_of_speech: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_durations() {
        let slice = AudioSlice {
            speech_id: "s".to_string(),
            play_audio: vec![0; 12000],
            play_sample_rate: 24000,
            algo_audio: vec![0.0; 16000],
            algo_sample_rate: 16000,
            end_of_speech: false,
            front_padding_duration: 0.0,
            end_padding_duration: 0.0,
        };
        assert!((slice.play_duration() - 0.5).abs() < 1e-9);
        assert!((slice.algo_duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_audio_frame_bytes() {
        let frame = AudioFrame {
            samples: vec![1, -1],
            pts: 0,
            sample_rate: 16000,
        };
        assert_eq!(frame.as_bytes().len(), 4);
        assert_eq!(&frame.as_bytes()[..2], &1i16.to_ne_bytes());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&AvatarStatus::Listening).unwrap();
        assert_eq!(json, "\"LISTENING\"");
        let opt: AvatarInitOption = serde_json::from_str(r#"{"video_frame_rate": 30}"#).unwrap();
        assert_eq!(opt.video_frame_rate, 30);
        assert_eq!(opt.audio_sample_rate, 24000);
    }
}
