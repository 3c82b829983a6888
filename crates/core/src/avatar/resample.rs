//! Resampling and PCM conversion for speech audio

use rubato::{FftFixedIn, Resampler};

use crate::Result;

/// Input chunk handed to the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Mono resampler that keeps its filter state across chunks of one stream
///
/// Output is delay-compensated. After [`StreamResampler::flush`] the total
/// output is exactly `round(total_input * to / from)` samples, so chunk
/// boundaries neither add edge artifacts nor accumulate rounding drift.
pub struct StreamResampler {
    from: u32,
    to: u32,
    /// `None` when the rates match
    resampler: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
    delay_left: usize,
    total_in: usize,
    total_out: usize,
}

impl StreamResampler {
    pub fn new(from: u32, to: u32) -> Result<Self> {
        let resampler = if from == to {
            None
        } else {
            Some(FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)?)
        };
        let delay_left = resampler.as_ref().map_or(0, |r| r.output_delay());
        Ok(Self {
            from,
            to,
            resampler,
            pending: Vec::new(),
            delay_left,
            total_in: 0,
            total_out: 0,
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.from
    }

    /// Feed `samples`; returns whatever output full input chunks produced
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        self.total_in += samples.len();
        let Some(resampler) = self.resampler.as_mut() else {
            self.total_out += samples.len();
            return Ok(samples.to_vec());
        };
        self.pending.extend_from_slice(samples);

        let mut output = Vec::new();
        let mut pos = 0;
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() - pos < needed {
                break;
            }
            let input: [&[f32]; 1] = [&self.pending[pos..pos + needed]];
            let out = resampler.process(&input[..], None)?;
            output.extend_from_slice(&out[0]);
            pos += needed;
        }
        self.pending.drain(..pos);
        Ok(self.emit(output))
    }

    /// Drain the filter; the stream is complete afterwards
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let expected = self.expected_len();
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };
        let mut raw = Vec::new();
        if !self.pending.is_empty() {
            let input: [&[f32]; 1] = [&self.pending[..]];
            let out = resampler.process_partial(Some(&input[..]), None)?;
            raw.extend_from_slice(&out[0]);
            self.pending.clear();
        }
        let mut output = self.emit(raw);
        while self.total_out < expected {
            let resampler = match self.resampler.as_mut() {
                Some(resampler) => resampler,
                None => break,
            };
            let out = resampler.process_partial(None::<&[&[f32]]>, None)?;
            if out[0].is_empty() {
                break;
            }
            let tail = out[0].clone();
            output.extend(self.emit(tail));
        }

        // trim overshoot or pad a filter that ran dry
        let excess = self.total_out.saturating_sub(expected);
        output.truncate(output.len().saturating_sub(excess));
        let missing = expected.saturating_sub(self.total_out);
        output.resize(output.len() + missing, 0.0);
        self.total_out = expected;
        Ok(output)
    }

    fn expected_len(&self) -> usize {
        (self.total_in as f64 * self.to as f64 / self.from as f64).round() as usize
    }

    fn emit(&mut self, mut raw: Vec<f32>) -> Vec<f32> {
        let skip = self.delay_left.min(raw.len());
        self.delay_left -= skip;
        raw.drain(..skip);
        self.total_out += raw.len();
        raw
    }
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("pending", &self.pending.len())
            .field("total_in", &self.total_in)
            .field("total_out", &self.total_out)
            .finish()
    }
}

/// Resample a complete mono buffer from `from` Hz to `to` Hz
///
/// The output is exactly `round(len * to / from)` samples long. Equal rates
/// return a copy.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = StreamResampler::new(from, to)?;
    let mut output = resampler.process(samples)?;
    output.extend(resampler.flush()?);
    Ok(output)
}

pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Clamp to `[-1, 1]` and scale by `i16::MAX`
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_identity_when_rates_match() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn test_output_length() {
        let samples = vec![0.0f32; 24000];
        assert_eq!(resample(&samples, 24000, 16000).unwrap().len(), 16000);
        assert_eq!(resample(&samples[..2400], 24000, 16000).unwrap().len(), 1600);
        assert_eq!(resample(&samples[..5], 16000, 8000).unwrap().len(), 3);
    }

    #[test]
    fn test_tone_keeps_energy() {
        let tone: Vec<f32> = (0..16000)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 16000.0).sin() * 0.5)
            .collect();
        let out = resample(&tone, 16000, 24000).unwrap();
        let rms = |s: &[f32]| (s.iter().map(|x| x * x).sum::<f32>() / s.len() as f32).sqrt();
        assert!((rms(&out[2000..22000]) - rms(&tone)).abs() < 0.05);
    }

    #[test]
    fn test_stream_matches_total_length_across_chunks() {
        let tone: Vec<f32> = (0..24000)
            .map(|i| (2.0 * PI * 220.0 * i as f32 / 24000.0).sin() * 0.5)
            .collect();
        let mut stream = StreamResampler::new(24000, 16000).unwrap();
        let mut out = Vec::new();
        for chunk in tone.chunks(777) {
            out.extend(stream.process(chunk).unwrap());
        }
        out.extend(stream.flush().unwrap());
        assert_eq!(out.len(), 16000);

        // one continuous stream, so no dips at the 777-sample input boundaries
        let whole = resample(&tone, 24000, 16000).unwrap();
        let max_diff = out[1000..15000]
            .iter()
            .zip(&whole[1000..15000])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff < 1e-4, "chunked output diverged by {}", max_diff);
    }

    #[test]
    fn test_stream_identity_passes_through() {
        let mut stream = StreamResampler::new(16000, 16000).unwrap();
        assert_eq!(stream.process(&[0.5, -0.5]).unwrap(), vec![0.5, -0.5]);
        assert!(stream.flush().unwrap().is_empty());
    }

    #[test]
    fn test_pcm_conversion_clamps() {
        assert_eq!(f32_to_pcm16(&[2.0, -2.0, 0.0]), vec![i16::MAX, -i16::MAX, 0]);
        assert_eq!(pcm16_to_f32(&[-32768])[0], -1.0);
    }
}
