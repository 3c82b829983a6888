//! Deterministic algorithm producing solid frames

use std::sync::atomic::{AtomicU32, Ordering};

use ndarray::Array3;
use parking_lot::Mutex;
use tracing::info;

use super::algorithm::AvatarAlgorithm;
use super::bg_frame_counter::BgFrameCounter;
use super::model::{AudioSlice, AvatarAlgoConfig, AvatarInitOption, AvatarStatus, Image, SignalData};
use crate::{Error, Result};

/// Blendshape coefficients per frame
pub const SIGNAL_DIM: usize = 52;
pub const FRAME_HEIGHT: usize = 480;
pub const FRAME_WIDTH: usize = 640;
const BG_FRAME_COUNT: usize = 10;

/// Zero blendshapes, black frames while listening and white while speaking
#[derive(Debug)]
pub struct SampleAlgorithm {
    fps: AtomicU32,
    bg_counter: Mutex<BgFrameCounter>,
}

impl Default for SampleAlgorithm {
    fn default() -> Self {
        Self {
            fps: AtomicU32::new(25),
            bg_counter: Mutex::new(BgFrameCounter::new(BG_FRAME_COUNT, 1)),
        }
    }
}

impl AvatarAlgorithm for SampleAlgorithm {
    fn name(&self) -> &str {
        "sample"
    }

    fn init(&self, option: &AvatarInitOption) -> Result<()> {
        if option.video_frame_rate == 0 {
            return Err(Error::ConfigError("video frame rate must be positive".to_string()));
        }
        self.fps.store(option.video_frame_rate, Ordering::Relaxed);
        info!(
            "Sample avatar '{}' initialised at {} fps",
            option.avatar_name, option.video_frame_rate
        );
        Ok(())
    }

    fn algo_config(&self) -> AvatarAlgoConfig {
        AvatarAlgoConfig::default()
    }

    fn audio_to_signal(&self, slice: &AudioSlice) -> Result<Vec<SignalData>> {
        let fps = self.fps.load(Ordering::Relaxed) as f64;
        let frames = (slice.algo_duration() * fps) as usize;
        Ok(vec![self.idle_signal(); frames])
    }

    fn signal_to_mouth(&self, _signal: &SignalData, status: AvatarStatus) -> Result<(Image, usize)> {
        let value = match status {
            AvatarStatus::Listening => 0,
            AvatarStatus::Speaking => 255,
        };
        let image = Array3::from_elem((FRAME_HEIGHT, FRAME_WIDTH, 3), value);
        Ok((image, self.bg_counter.lock().next_index()))
    }

    fn mouth_to_full(&self, mouth: Image, _bg_frame_id: usize) -> Result<Image> {
        Ok(mouth)
    }

    fn idle_signal(&self) -> SignalData {
        SignalData::zeros(SIGNAL_DIM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(algo_len: usize) -> AudioSlice {
        AudioSlice {
            speech_id: "s".to_string(),
            play_audio: vec![0; algo_len],
            play_sample_rate: 16000,
            algo_audio: vec![0.0; algo_len],
            algo_sample_rate: 16000,
            end_of_speech: false,
            front_padding_duration: 0.0,
            end_padding_duration: 0.0,
        }
    }

    #[test]
    fn test_one_signal_per_frame() {
        let algo = SampleAlgorithm::default();
        assert_eq!(algo.audio_to_signal(&slice(16000)).unwrap().len(), 25);
        assert_eq!(algo.audio_to_signal(&slice(8000)).unwrap().len(), 12);
        algo.init(&AvatarInitOption {
            video_frame_rate: 30,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(algo.audio_to_signal(&slice(16000)).unwrap().len(), 30);
    }

    #[test]
    fn test_status_colours_and_bg_cycle() {
        let algo = SampleAlgorithm::default();
        let signal = algo.idle_signal();
        assert_eq!(signal.len(), SIGNAL_DIM);
        let (listening, bg0) = algo.signal_to_mouth(&signal, AvatarStatus::Listening).unwrap();
        let (speaking, bg1) = algo.signal_to_mouth(&signal, AvatarStatus::Speaking).unwrap();
        assert_eq!(listening.shape(), &[FRAME_HEIGHT, FRAME_WIDTH, 3]);
        assert!(listening.iter().all(|&v| v == 0));
        assert!(speaking.iter().all(|&v| v == 255));
        assert_eq!((bg0, bg1), (0, 1));
    }
}
