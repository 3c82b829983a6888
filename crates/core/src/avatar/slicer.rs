//! Cutting speech audio into fixed-duration slices

use tracing::debug;

use super::model::{AudioSlice, AvatarAlgoConfig, SpeechAudio};
use super::resample::{f32_to_pcm16, pcm16_to_f32, resample, StreamResampler};
use crate::{Error, Result};

/// Fixed-size slicer carrying the remainder across calls
#[derive(Debug, Clone)]
pub struct GeneralSlicer<T> {
    slice_size: usize,
    buffer: Vec<T>,
}

impl<T: Clone> GeneralSlicer<T> {
    pub fn new(slice_size: usize) -> Self {
        Self {
            slice_size: slice_size.max(1),
            buffer: Vec::new(),
        }
    }

    pub fn slice_size(&self) -> usize {
        self.slice_size
    }

    /// Takes effect from the next slice on
    pub fn set_slice_size(&mut self, slice_size: usize) {
        self.slice_size = slice_size.max(1);
    }

    pub fn push(&mut self, data: &[T]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop one full slice of the current size
    pub fn next_slice(&mut self) -> Option<Vec<T>> {
        if self.buffer.len() < self.slice_size {
            return None;
        }
        let rest = self.buffer.split_off(self.slice_size);
        Some(std::mem::replace(&mut self.buffer, rest))
    }

    /// Push `data` and return every full slice now available
    pub fn slice(&mut self, data: &[T]) -> Vec<Vec<T>> {
        self.push(data);
        std::iter::from_fn(|| self.next_slice()).collect()
    }

    pub fn remainder_len(&self) -> usize {
        self.buffer.len()
    }

    /// Take whatever is left, possibly empty
    pub fn flush(&mut self) -> Vec<T> {
        std::mem::take(&mut self.buffer)
    }
}

/// Turns speech chunks into [`AudioSlice`]s
///
/// Incoming audio is resampled to the playback rate by one resampler per
/// speech, so chunk boundaries stay seamless, and cut into slices of
/// the algorithm's slice duration; each slice is also resampled to the
/// algorithm input rate. On end of speech the remainder becomes a final
/// slice whose algorithm audio is padded with silence to full length.
/// In fast mode the first slice of a speech is half length, front-padded
/// with silence so the first frames come out sooner.
#[derive(Debug)]
pub struct SpeechAudioSlicer {
    play_sample_rate: u32,
    algo_config: AvatarAlgoConfig,
    fast_mode: bool,
    slicer: GeneralSlicer<i16>,
    input_resampler: Option<StreamResampler>,
    speech_id: Option<String>,
    first_slice: bool,
}

impl SpeechAudioSlicer {
    pub fn new(play_sample_rate: u32, algo_config: AvatarAlgoConfig, fast_mode: bool) -> Result<Self> {
        if play_sample_rate == 0 || algo_config.input_audio_sample_rate == 0 {
            return Err(Error::ConfigError("sample rates must be positive".to_string()));
        }
        if algo_config.input_audio_slice_duration <= 0.0 {
            return Err(Error::ConfigError(format!(
                "invalid slice duration {}",
                algo_config.input_audio_slice_duration
            )));
        }
        let mut slicer = Self {
            play_sample_rate,
            algo_config,
            fast_mode,
            slicer: GeneralSlicer::new(1),
            input_resampler: None,
            speech_id: None,
            first_slice: true,
        };
        slicer.reset();
        Ok(slicer)
    }

    pub fn play_sample_rate(&self) -> u32 {
        self.play_sample_rate
    }

    /// Playback samples in one full slice
    pub fn play_slice_len(&self) -> usize {
        (self.algo_config.input_audio_slice_duration * self.play_sample_rate as f64).round() as usize
    }

    fn algo_slice_len(&self) -> usize {
        (self.algo_config.input_audio_slice_duration * self.algo_config.input_audio_sample_rate as f64)
            .round() as usize
    }

    fn first_slice_len(&self) -> usize {
        if self.fast_mode {
            (self.play_slice_len() / 2).max(1)
        } else {
            self.play_slice_len()
        }
    }

    /// Drop buffered audio and start over with a new speech
    pub fn reset(&mut self) {
        self.speech_id = None;
        self.input_resampler = None;
        self.first_slice = true;
        let first_len = self.first_slice_len();
        self.slicer.flush();
        self.slicer.set_slice_size(first_len);
    }

    pub fn slice(&mut self, audio: SpeechAudio) -> Result<Vec<AudioSlice>> {
        if self.speech_id.as_deref() != Some(audio.speech_id.as_str()) {
            if self.slicer.remainder_len() > 0 {
                debug!(
                    "Speech {:?} interrupted, dropping {} buffered samples",
                    self.speech_id,
                    self.slicer.remainder_len()
                );
            }
            self.reset();
            self.speech_id = Some(audio.speech_id.clone());
        }

        let play = self.to_play_rate(&audio)?;
        self.slicer.push(&play);

        let mut slices = Vec::new();
        while let Some(chunk) = self.slicer.next_slice() {
            let front_pad = if self.first_slice {
                self.play_slice_len() - chunk.len()
            } else {
                0
            };
            if self.first_slice {
                let full_len = self.play_slice_len();
                self.first_slice = false;
                self.slicer.set_slice_size(full_len);
            }
            slices.push(self.make_slice(&audio.speech_id, chunk, front_pad, false)?);
        }

        if audio.end_of_speech {
            let rest = self.slicer.flush();
            if !rest.is_empty() || slices.is_empty() {
                slices.push(self.make_slice(&audio.speech_id, rest, 0, true)?);
            } else if let Some(last) = slices.last_mut() {
                last.end_of_speech = true;
            }
            self.reset();
        }
        Ok(slices)
    }

    /// Resample one chunk of the current speech to the playback rate
    ///
    /// The resampler is drained at end of speech; a change of input rate
    /// drains the old one and starts a new one.
    fn to_play_rate(&mut self, audio: &SpeechAudio) -> Result<Vec<i16>> {
        let mut play = Vec::new();
        let resampler = match self.input_resampler.take() {
            Some(resampler) if resampler.input_rate() == audio.sample_rate => Some(resampler),
            Some(mut previous) => {
                debug!(
                    "Speech {} input rate changed from {} to {} Hz",
                    audio.speech_id,
                    previous.input_rate(),
                    audio.sample_rate
                );
                play.extend(f32_to_pcm16(&previous.flush()?));
                None
            }
            None => None,
        };
        if audio.sample_rate == self.play_sample_rate {
            play.extend_from_slice(&audio.samples);
            return Ok(play);
        }

        let mut resampler = match resampler {
            Some(resampler) => resampler,
            None => StreamResampler::new(audio.sample_rate, self.play_sample_rate)?,
        };
        let mut resampled = resampler.process(&pcm16_to_f32(&audio.samples))?;
        if audio.end_of_speech {
            resampled.extend(resampler.flush()?);
        } else {
            self.input_resampler = Some(resampler);
        }
        play.extend(f32_to_pcm16(&resampled));
        Ok(play)
    }

    fn make_slice(
        &self,
        speech_id: &str,
        chunk: Vec<i16>,
        front_pad: usize,
        end_of_speech: bool,
    ) -> Result<AudioSlice> {
        let mut play_audio = vec![0i16; front_pad];
        play_audio.extend(chunk);

        let mut algo_audio = resample(
            &pcm16_to_f32(&play_audio),
            self.play_sample_rate,
            self.algo_config.input_audio_sample_rate,
        )?;
        let mut end_padding = 0;
        if end_of_speech {
            let target = self.algo_slice_len();
            if algo_audio.len() < target {
                end_padding = target - algo_audio.len();
                algo_audio.resize(target, 0.0);
            }
        }

        Ok(AudioSlice {
            speech_id: speech_id.to_string(),
            play_audio,
            play_sample_rate: self.play_sample_rate,
            algo_audio,
            algo_sample_rate: self.algo_config.input_audio_sample_rate,
            end_of_speech,
            front_padding_duration: front_pad as f64 / self.play_sample_rate as f64,
            end_padding_duration: end_padding as f64 / self.algo_config.input_audio_sample_rate as f64,
        })
    }
}
