//! Pluggable rendering algorithm

use std::sync::Arc;

use super::model::{AudioSlice, AvatarAlgoConfig, AvatarInitOption, AvatarStatus, Image, SignalData};
use super::sample::SampleAlgorithm;
use crate::{Error, Result};

/// Turns speech audio into avatar frames
///
/// Stage 1 calls [`audio_to_signal`](Self::audio_to_signal), stage 2
/// [`signal_to_mouth`](Self::signal_to_mouth) and stage 3
/// [`mouth_to_full`](Self::mouth_to_full), each from its own thread.
pub trait AvatarAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    /// Load models and assets
    fn init(&self, option: &AvatarInitOption) -> Result<()>;

    /// Audio format expected by [`audio_to_signal`](Self::audio_to_signal)
    fn algo_config(&self) -> AvatarAlgoConfig;

    /// One signal per video frame covering the slice's algorithm audio
    fn audio_to_signal(&self, slice: &AudioSlice) -> Result<Vec<SignalData>>;

    /// Mouth image and the background frame it belongs to
    fn signal_to_mouth(&self, signal: &SignalData, status: AvatarStatus) -> Result<(Image, usize)>;

    /// Composite the mouth image onto background frame `bg_frame_id`
    fn mouth_to_full(&self, mouth: Image, bg_frame_id: usize) -> Result<Image>;

    /// Signal rendered while nothing is being said
    fn idle_signal(&self) -> SignalData;
}

/// Known algorithm names
pub const ALGORITHMS: &[&str] = &["sample"];

/// Instantiate an algorithm by name
pub fn create_algorithm(name: &str) -> Result<Arc<dyn AvatarAlgorithm>> {
    match name {
        "sample" => Ok(Arc::new(SampleAlgorithm::default())),
        other => Err(Error::ConfigError(format!(
            "unknown avatar algorithm '{}', available: {}",
            other,
            ALGORITHMS.join(", ")
        ))),
    }
}
