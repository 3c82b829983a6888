//! Aligns playback audio to the number of rendered video frames

use tracing::debug;

use crate::{Error, Result};

/// Size of one 16-bit PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Keeps the audio of one speech exactly as long as its video
///
/// Audio is passed through while a speech is in progress. On end of speech
/// the accumulated audio is padded with silence or truncated to
/// `frames * sample_rate / fps` samples, and whatever part of it was not
/// returned yet is handed back.
#[derive(Debug)]
pub struct VideoAudioAligner {
    fps: u32,
    speech_id: Option<String>,
    accumulated: Vec<i16>,
    returned: usize,
    frame_count: usize,
}

impl VideoAudioAligner {
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            speech_id: None,
            accumulated: Vec::new(),
            returned: 0,
            frame_count: 0,
        }
    }

    /// Samples covering exactly one video frame
    pub fn samples_per_frame(&self, sample_rate: u32) -> Result<usize> {
        if self.fps == 0 || sample_rate % self.fps != 0 {
            return Err(Error::InvalidData(format!(
                "sample rate {} is not a multiple of {} fps",
                sample_rate, self.fps
            )));
        }
        Ok((sample_rate / self.fps) as usize)
    }

    /// Expected length in bytes of the audio for the frames seen so far
    pub fn expected_bytes(&self, sample_rate: u32) -> Result<usize> {
        Ok(self.frame_count * self.samples_per_frame(sample_rate)? * BYTES_PER_SAMPLE)
    }

    pub fn align(
        &mut self,
        speech_id: &str,
        audio: &[i16],
        sample_rate: u32,
        frame_count: usize,
        end_of_speech: bool,
    ) -> Result<Vec<i16>> {
        let samples_per_frame = self.samples_per_frame(sample_rate)?;
        if self.speech_id.as_deref() != Some(speech_id) {
            self.reset();
            self.speech_id = Some(speech_id.to_string());
        }

        self.accumulated.extend_from_slice(audio);
        self.frame_count += frame_count;

        if !end_of_speech {
            self.returned += audio.len();
            return Ok(audio.to_vec());
        }

        let expected = self.frame_count * samples_per_frame;
        debug!(
            "Speech {}: aligning {} samples to {} frames ({} samples)",
            speech_id,
            self.accumulated.len(),
            self.frame_count,
            expected
        );
        self.accumulated.resize(expected, 0);
        let start = self.returned.min(expected);
        let tail = self.accumulated[start..].to_vec();
        self.reset();
        Ok(tail)
    }

    fn reset(&mut self) {
        self.speech_id = None;
        self.accumulated.clear();
        self.returned = 0;
        self.frame_count = 0;
    }
}
