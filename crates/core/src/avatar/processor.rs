//! Three-stage real-time render pipeline
//!
//! ```text
//! add_audio ──> [audio2signal] ──> [signal2img] ──> [mouth2full] ──> outputs
//!   slicer        stage 1            stage 2           stage 3
//!                 paced by the       paced at fps,     pts counters,
//!                 speed limiter      idle frames       status changes
//! ```
//!
//! Each stage runs on its own thread and hands records to the next one
//! through an unbounded queue. [`AvatarProcessor::interrupt`] discards the
//! slices stage 1 has not picked up yet.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::aligner::VideoAudioAligner;
use super::algorithm::AvatarAlgorithm;
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::model::{
    AudioFrame, AudioResult, AudioSlice, AvatarInitOption, AvatarStatus, Image, MouthResult,
    SignalResult, SpeechAudio, VideoFrame, VideoResult,
};
use super::output::AvatarOutputHandler;
use super::slicer::SpeechAudioSlicer;
use super::speed_limiter::SpeedLimiter;
use crate::utils::IntervalCounter;
use crate::{Error, Result};

/// Queue poll timeout of the stage threads; bounds shutdown latency
pub const STAGE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Head start stage 1 gets before stage 2 begins emitting frames
pub const STAGE2_START_DELAY: Duration = Duration::from_millis(500);

const COUNTER_INTERVAL: Duration = Duration::from_secs(10);

type OutputHandlers = Arc<RwLock<Vec<Arc<dyn AvatarOutputHandler>>>>;

/// Progress of the current speech
///
/// `speech_id` and `ended` are written by stage 1 only. `interrupt` raises
/// `end_dropped` when it discards an end-of-speech slice; stage 1 folds it
/// into `ended` around each slice it takes.
#[derive(Debug)]
struct SpeechProgress {
    speech_id: Mutex<String>,
    ended: AtomicBool,
    end_dropped: AtomicBool,
}

impl Default for SpeechProgress {
    fn default() -> Self {
        Self {
            speech_id: Mutex::new(String::new()),
            ended: AtomicBool::new(true),
            end_dropped: AtomicBool::new(false),
        }
    }
}

impl SpeechProgress {
    fn reset(&self) {
        self.speech_id.lock().clear();
        self.ended.store(true, Ordering::Release);
        self.end_dropped.store(false, Ordering::Release);
    }

    /// Close the current speech if an interrupt dropped its end
    fn settle_interrupt(&self) {
        if self.end_dropped.swap(false, Ordering::AcqRel) {
            debug!("Speech {} ended by interrupt", self.speech_id.lock());
            self.ended.store(true, Ordering::Release);
        }
    }
}

/// One breaker per stage; stage 2 and 3 keep rendering while stage 1 is open
#[derive(Debug)]
struct StageBreakers {
    audio2signal: Arc<CircuitBreaker>,
    signal2img: Arc<CircuitBreaker>,
    mouth2full: Arc<CircuitBreaker>,
}

impl StageBreakers {
    fn new(algorithm: &str, config: CircuitBreakerConfig) -> Self {
        let breaker = |stage: &str| {
            Arc::new(CircuitBreaker::new(format!("avatar:{}:{}", algorithm, stage), config))
        };
        Self {
            audio2signal: breaker("audio2signal"),
            signal2img: breaker("signal2img"),
            mouth2full: breaker("mouth2full"),
        }
    }
}

/// Renders speech audio into paced audio and video frames
pub struct AvatarProcessor {
    algorithm: Arc<dyn AvatarAlgorithm>,
    option: AvatarInitOption,
    breakers: StageBreakers,
    slicer: Mutex<SpeechAudioSlicer>,
    slice_tx: Sender<AudioSlice>,
    slice_rx: Receiver<AudioSlice>,
    progress: Arc<SpeechProgress>,
    outputs: OutputHandlers,
    running: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl AvatarProcessor {
    /// Initialise `algorithm` and prepare an idle pipeline
    pub fn new(
        algorithm: Arc<dyn AvatarAlgorithm>,
        option: AvatarInitOption,
        breaker_config: CircuitBreakerConfig,
    ) -> Result<Self> {
        VideoAudioAligner::new(option.video_frame_rate).samples_per_frame(option.audio_sample_rate)?;
        algorithm.init(&option)?;
        let slicer = SpeechAudioSlicer::new(
            option.audio_sample_rate,
            algorithm.algo_config(),
            option.enable_fast_mode,
        )?;
        let (slice_tx, slice_rx) = unbounded();
        let breakers = StageBreakers::new(algorithm.name(), breaker_config);
        Ok(Self {
            algorithm,
            option,
            breakers,
            slicer: Mutex::new(slicer),
            slice_tx,
            slice_rx,
            progress: Arc::new(SpeechProgress::default()),
            outputs: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
            threads: Mutex::new(Vec::new()),
        })
    }

    pub fn option(&self) -> &AvatarInitOption {
        &self.option
    }

    /// Breaker guarding stage `stage` (1 to 3)
    pub fn circuit_breaker(&self, stage: usize) -> Option<&CircuitBreaker> {
        match stage {
            1 => Some(&self.breakers.audio2signal),
            2 => Some(&self.breakers.signal2img),
            3 => Some(&self.breakers.mouth2full),
            _ => None,
        }
    }

    pub fn register_output_handler(&self, handler: Arc<dyn AvatarOutputHandler>) {
        self.outputs.write().push(handler);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Frames produced by stage 2 since creation
    pub fn global_frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Slices waiting for stage 1
    pub fn pending_slices(&self) -> usize {
        self.slice_rx.len()
    }

    /// Spawn the stage threads; a second call while running is a no-op
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Avatar processor already running");
            return Ok(());
        }
        for handler in self.outputs.read().iter() {
            handler.on_start(&self.option);
        }

        let (signal_tx, signal_rx) = unbounded();
        let (mouth_tx, mouth_rx) = unbounded();
        self.progress.reset();
        let progress = Arc::clone(&self.progress);
        let fps = self.option.video_frame_rate;

        let stage1 = Audio2SignalStage {
            algorithm: Arc::clone(&self.algorithm),
            breaker: Arc::clone(&self.breakers.audio2signal),
            running: Arc::clone(&self.running),
            progress: Arc::clone(&progress),
            input: self.slice_rx.clone(),
            output: signal_tx,
            aligner: VideoAudioAligner::new(fps),
            limiter: SpeedLimiter::default(),
            fps,
            last_speech_id: None,
        };
        let stage2 = Signal2ImgStage {
            algorithm: Arc::clone(&self.algorithm),
            breaker: Arc::clone(&self.breakers.signal2img),
            running: Arc::clone(&self.running),
            progress,
            frame_count: Arc::clone(&self.frame_count),
            input: signal_rx,
            output: mouth_tx,
            fps,
            sample_rate: self.option.audio_sample_rate,
            last_mouth: None,
        };
        let stage3 = Mouth2FullStage {
            algorithm: Arc::clone(&self.algorithm),
            breaker: Arc::clone(&self.breakers.mouth2full),
            running: Arc::clone(&self.running),
            outputs: Arc::clone(&self.outputs),
            input: mouth_rx,
            fps,
            sample_rate: self.option.audio_sample_rate,
            video_pts: 0,
            audio_pts: 0,
            last_full: None,
            last_status: None,
        };

        let spawned = self
            .spawn("avatar-audio2signal", move || stage1.run())
            .and_then(|_| self.spawn("avatar-signal2img", move || stage2.run()))
            .and_then(|_| self.spawn("avatar-mouth2full", move || stage3.run()));
        if let Err(e) = spawned {
            self.stop();
            return Err(e);
        }
        info!(
            "Avatar processor started: {} Hz audio, {} fps, fast mode {}",
            self.option.audio_sample_rate, fps, self.option.enable_fast_mode
        );
        Ok(())
    }

    fn spawn<F>(&self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| Error::Execution(format!("failed to spawn {}: {}", name, e)))?;
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Join the stage threads and discard everything still queued
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        let threads: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for handle in threads {
            let name = handle.thread().name().unwrap_or("avatar").to_string();
            if handle.join().is_err() {
                error!("Avatar stage thread {} panicked", name);
            }
        }
        let dropped = self.slice_rx.try_iter().count();
        self.slicer.lock().reset();
        if was_running {
            for handler in self.outputs.read().iter() {
                handler.on_stop();
            }
            info!("Avatar processor stopped, {} slices dropped", dropped);
        }
    }

    /// Slice `audio` and queue the slices for stage 1
    pub fn add_audio(&self, audio: SpeechAudio) -> Result<usize> {
        let slices = self.slicer.lock().slice(audio)?;
        let count = slices.len();
        for slice in slices {
            debug!("Queueing {}", slice);
            self.slice_tx
                .send(slice)
                .map_err(|_| Error::InvalidState("avatar slice queue closed".to_string()))?;
        }
        Ok(count)
    }

    /// Discard slices stage 1 has not started on; returns how many
    pub fn interrupt(&self) -> usize {
        let mut dropped = 0;
        let mut end_dropped = false;
        for slice in self.slice_rx.try_iter() {
            dropped += 1;
            end_dropped |= slice.end_of_speech;
        }
        if end_dropped {
            self.progress.end_dropped.store(true, Ordering::Release);
        }
        info!(
            "Avatar interrupted, {} pending slices dropped (end of speech dropped: {})",
            dropped, end_dropped
        );
        dropped
    }
}

impl Drop for AvatarProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sleep_until(deadline: Instant, running: &AtomicBool) {
    loop {
        let now = Instant::now();
        if now >= deadline || !running.load(Ordering::Acquire) {
            return;
        }
        thread::sleep((deadline - now).min(STAGE_POLL_INTERVAL));
    }
}

struct Audio2SignalStage {
    algorithm: Arc<dyn AvatarAlgorithm>,
    breaker: Arc<CircuitBreaker>,
    running: Arc<AtomicBool>,
    progress: Arc<SpeechProgress>,
    input: Receiver<AudioSlice>,
    output: Sender<SignalResult>,
    aligner: VideoAudioAligner,
    limiter: SpeedLimiter,
    fps: u32,
    last_speech_id: Option<String>,
}

impl Audio2SignalStage {
    fn run(mut self) {
        let mut counter = IntervalCounter::new("avatar audio2signal frames", COUNTER_INTERVAL);
        while self.running.load(Ordering::Acquire) {
            let received = self.input.recv_timeout(STAGE_POLL_INTERVAL);
            self.progress.settle_interrupt();
            let slice = match received {
                Ok(slice) => slice,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let started = Instant::now();
            match self.process(&slice) {
                Ok(frames) => {
                    counter.add(frames as u64);
                }
                Err(e) => warn!("Speech {}: dropping slice: {}", slice.speech_id, e),
            }
            if slice.end_of_speech {
                self.progress.ended.store(true, Ordering::Release);
            }
            // the rest of this speech may have been dropped while processing
            self.progress.settle_interrupt();
            if let Some(delay) = self.limiter.delay(
                slice.play_duration(),
                slice.front_padding_duration,
                started.elapsed(),
            ) {
                sleep_until(Instant::now() + delay, &self.running);
            }
        }
        debug!("audio2signal stage exited");
    }

    fn process(&mut self, slice: &AudioSlice) -> Result<usize> {
        if self.last_speech_id.as_deref() != Some(slice.speech_id.as_str()) {
            debug!("Speech {} started", slice.speech_id);
            self.last_speech_id = Some(slice.speech_id.clone());
            *self.progress.speech_id.lock() = slice.speech_id.clone();
            self.progress.ended.store(false, Ordering::Release);
        }

        let algorithm = &self.algorithm;
        let mut signals = self.breaker.call(|| algorithm.audio_to_signal(slice))?;

        let fps = self.fps as f64;
        let front_frames = ((slice.front_padding_duration * fps) as usize).min(signals.len());
        let front_samples = ((slice.front_padding_duration * slice.play_sample_rate as f64).round()
            as usize)
            .min(slice.play_audio.len());
        signals.drain(..front_frames);
        let end_frames = ((slice.end_padding_duration * fps) as usize).min(signals.len());
        signals.truncate(signals.len() - end_frames);

        let aligned = self.aligner.align(
            &slice.speech_id,
            &slice.play_audio[front_samples..],
            slice.play_sample_rate,
            signals.len(),
            slice.end_of_speech,
        )?;
        if signals.is_empty() {
            if !aligned.is_empty() {
                debug!(
                    "Speech {}: no frames left for {} samples",
                    slice.speech_id,
                    aligned.len()
                );
            }
            return Ok(0);
        }

        let mut audio = Some(Arc::new(AudioSlice {
            play_audio: aligned,
            front_padding_duration: 0.0,
            end_padding_duration: 0.0,
            ..slice.clone()
        }));
        let last = signals.len() - 1;
        let count = signals.len();
        for (i, signal) in signals.into_iter().enumerate() {
            let result = SignalResult {
                speech_id: slice.speech_id.clone(),
                signal,
                avatar_status: AvatarStatus::Speaking,
                end_of_speech: slice.end_of_speech && i == last,
                audio: audio.take(),
                is_idle: false,
            };
            if self.output.send(result).is_err() {
                return Err(Error::InvalidState("signal queue closed".to_string()));
            }
        }
        Ok(count)
    }
}

struct Signal2ImgStage {
    algorithm: Arc<dyn AvatarAlgorithm>,
    breaker: Arc<CircuitBreaker>,
    running: Arc<AtomicBool>,
    progress: Arc<SpeechProgress>,
    frame_count: Arc<AtomicU64>,
    input: Receiver<SignalResult>,
    output: Sender<MouthResult>,
    fps: u32,
    sample_rate: u32,
    last_mouth: Option<(Image, usize)>,
}

impl Signal2ImgStage {
    fn run(mut self) {
        let mut counter = IntervalCounter::new("avatar signal2img frames", COUNTER_INTERVAL);
        let start = Instant::now() + STAGE2_START_DELAY;
        let mut frame_index: u64 = 0;
        while self.running.load(Ordering::Acquire) {
            let target = start + Duration::from_secs_f64(frame_index as f64 / self.fps as f64);
            sleep_until(target, &self.running);
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            frame_index += 1;

            let signal = match self.input.try_recv() {
                Ok(signal) => signal,
                Err(TryRecvError::Empty) => self.idle_signal(),
                Err(TryRecvError::Disconnected) => break,
            };
            let Some(mouth) = self.render(signal) else {
                continue;
            };
            self.frame_count.fetch_add(1, Ordering::Relaxed);
            counter.add(1);
            if self.output.send(mouth).is_err() {
                break;
            }
        }
        debug!("signal2img stage exited");
    }

    fn idle_signal(&self) -> SignalResult {
        let ended = self.progress.ended.load(Ordering::Acquire);
        let speech_id = if ended {
            String::new()
        } else {
            self.progress.speech_id.lock().clone()
        };
        let samples = (self.sample_rate / self.fps) as usize;
        let audio = AudioSlice {
            speech_id: speech_id.clone(),
            play_audio: vec![0; samples],
            play_sample_rate: self.sample_rate,
            algo_audio: Vec::new(),
            algo_sample_rate: self.sample_rate,
            end_of_speech: false,
            front_padding_duration: 0.0,
            end_padding_duration: 0.0,
        };
        SignalResult {
            speech_id,
            signal: self.algorithm.idle_signal(),
            avatar_status: if ended {
                AvatarStatus::Listening
            } else {
                AvatarStatus::Speaking
            },
            end_of_speech: false,
            audio: Some(Arc::new(audio)),
            is_idle: true,
        }
    }

    fn render(&mut self, signal: SignalResult) -> Option<MouthResult> {
        let algorithm = &self.algorithm;
        let rendered = self
            .breaker
            .call(|| algorithm.signal_to_mouth(&signal.signal, signal.avatar_status));
        let (mouth_image, bg_frame_id) = match rendered {
            Ok(mouth) => {
                self.last_mouth = Some(mouth.clone());
                mouth
            }
            Err(e) => match &self.last_mouth {
                Some(last) => {
                    debug!("signal2img failed, repeating last frame: {}", e);
                    last.clone()
                }
                None => {
                    warn!("signal2img failed with no frame to repeat, frame dropped: {}", e);
                    return None;
                }
            },
        };
        Some(MouthResult {
            speech_id: signal.speech_id,
            mouth_image,
            bg_frame_id,
            avatar_status: signal.avatar_status,
            end_of_speech: signal.end_of_speech,
            audio: signal.audio,
        })
    }
}

struct Mouth2FullStage {
    algorithm: Arc<dyn AvatarAlgorithm>,
    breaker: Arc<CircuitBreaker>,
    running: Arc<AtomicBool>,
    outputs: OutputHandlers,
    input: Receiver<MouthResult>,
    fps: u32,
    sample_rate: u32,
    video_pts: u64,
    audio_pts: u64,
    last_full: Option<Image>,
    last_status: Option<AvatarStatus>,
}

impl Mouth2FullStage {
    fn run(mut self) {
        let mut counter = IntervalCounter::new("avatar mouth2full frames", COUNTER_INTERVAL);
        while self.running.load(Ordering::Acquire) {
            let mouth = match self.input.recv_timeout(STAGE_POLL_INTERVAL) {
                Ok(mouth) => mouth,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            self.deliver(mouth);
            counter.add(1);
        }
        debug!("mouth2full stage exited");
    }

    fn compose(&mut self, mouth_image: Image, bg_frame_id: usize) -> Option<Image> {
        let algorithm = &self.algorithm;
        match self.breaker.call(|| algorithm.mouth_to_full(mouth_image, bg_frame_id)) {
            Ok(full) => {
                self.last_full = Some(full.clone());
                Some(full)
            }
            Err(e) => {
                debug!("mouth2full failed, repeating last frame: {}", e);
                self.last_full.clone()
            }
        }
    }

    fn deliver(&mut self, mouth: MouthResult) {
        let outputs = Arc::clone(&self.outputs);
        let outputs = outputs.read();

        if let Some(audio) = mouth.audio.as_ref().filter(|a| !a.play_audio.is_empty()) {
            let frame = AudioFrame {
                samples: audio.play_audio.clone(),
                pts: self.audio_pts,
                sample_rate: self.sample_rate,
            };
            self.audio_pts += audio.play_audio.len() as u64;
            for handler in outputs.iter() {
                handler.on_audio(AudioResult {
                    speech_id: mouth.speech_id.clone(),
                    frame: frame.clone(),
                    end_of_speech: audio.end_of_speech,
                });
            }
        }

        match self.compose(mouth.mouth_image, mouth.bg_frame_id) {
            Some(image) => {
                let frame = VideoFrame {
                    image,
                    pts: self.video_pts,
                    fps: self.fps,
                };
                self.video_pts += 1;
                for handler in outputs.iter() {
                    handler.on_video(VideoResult {
                        speech_id: mouth.speech_id.clone(),
                        frame: frame.clone(),
                        avatar_status: mouth.avatar_status,
                        end_of_speech: mouth.end_of_speech,
                    });
                }
            }
            None => warn!("mouth2full failed with no frame to repeat, video frame dropped"),
        }

        let previous = self.last_status.replace(mouth.avatar_status);
        if let Some(previous) = previous.filter(|p| *p != mouth.avatar_status) {
            debug!(
                "Avatar status {} -> {} (speech {})",
                previous, mouth.avatar_status, mouth.speech_id
            );
            for handler in outputs.iter() {
                handler.on_avatar_status_change(&mouth.speech_id, mouth.avatar_status);
            }
        }
    }
}
