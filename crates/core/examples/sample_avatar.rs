//! Render a short utterance with the sample avatar
//!
//! Builds an engine from an inline YAML configuration, starts a session with
//! the `avatar` handler and feeds it two seconds of a 220 Hz tone as if a
//! speech synthesis handler produced it. Frame and audio counts are printed
//! once the avatar returns to listening.
//!
//! Run with:
//! ```bash
//! cargo run --example sample_avatar
//! ```

use std::time::{Duration, Instant};

use anyhow::Context;
use avatarchat_core::avatar::{META_SPEECH_END, META_SPEECH_ID};
use avatarchat_core::config::ServiceConfig;
use avatarchat_core::data::{
    ChatData, ChatDataType, DataBundle, DataBundleDefinition, DataBundleEntry, DataValue,
    EngineChannelType,
};
use avatarchat_core::session::{SessionInfo, SessionIo};
use avatarchat_core::{ChatEngine, HandlerRegistry};
use ndarray::Array2;

const CONFIG: &str = r#"
logger:
  log_level: info
chat_engine:
  handler_configs:
    Avatar:
      module: avatar
      fps: 25
      audio_sample_rate: 24000
  outputs:
    video: { handler: Avatar, type: avatar_video }
    audio: { handler: Avatar, type: avatar_audio }
"#;

const TTS_SAMPLE_RATE: u32 = 16000;

fn tone(seconds: f32) -> Array2<f32> {
    let len = (TTS_SAMPLE_RATE as f32 * seconds) as usize;
    Array2::from_shape_fn((1, len), |(_, i)| {
        let t = i as f32 / TTS_SAMPLE_RATE as f32;
        0.3 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
    })
}

fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_yaml_str(CONFIG).context("parsing configuration")?;
    avatarchat_core::logging::init(&config.logger);

    let registry = HandlerRegistry::with_builtin()?;
    let engine = ChatEngine::new(config.chat_engine.clone(), &registry)?;
    let io = SessionIo::for_config(engine.config());
    let video_rx = io
        .output_receiver(EngineChannelType::Video)
        .context("video output not configured")?;
    let audio_rx = io
        .output_receiver(EngineChannelType::Audio)
        .context("audio output not configured")?;
    let session = engine.create_session(SessionInfo::new("sample"), io)?;
    session.start()?;

    let mut definition = DataBundleDefinition::with_entry(DataBundleEntry::audio(
        "tts_audio",
        1,
        TTS_SAMPLE_RATE,
    ))?;
    let mut bundle = DataBundle::new(&definition.lockdown());
    bundle.set_main_data(tone(2.0))?;
    bundle.add_meta(META_SPEECH_ID, "hello");
    bundle.add_meta(META_SPEECH_END, true);
    let mut speech = ChatData::new(ChatDataType::AvatarAudio, bundle);
    speech.source = "tts".to_string();
    session.distribute_data(speech)?;

    let started = Instant::now();
    let mut speaking_frames = 0usize;
    let mut idle_frames = 0usize;
    let mut speech_samples = 0usize;
    let mut speech_done = false;
    while started.elapsed() < Duration::from_secs(6) {
        for video in video_rx.try_iter() {
            match video.data.meta_str(META_SPEECH_ID) {
                Some("hello") => speaking_frames += 1,
                _ => idle_frames += 1,
            }
        }
        for audio in audio_rx.try_iter() {
            if audio.data.meta_str(META_SPEECH_ID) != Some("hello") {
                continue;
            }
            speech_samples += audio
                .data
                .get_main_data()
                .and_then(DataValue::as_array)
                .map_or(0, |a| a.len());
            speech_done |= audio.data.meta_bool(META_SPEECH_END, false);
        }
        if speech_done && speaking_frames > 0 && idle_frames > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(40));
    }
    engine.stop_session(session.session_id())?;

    println!("speech frames: {}", speaking_frames);
    println!("idle frames:   {}", idle_frames);
    println!(
        "speech audio:  {} samples ({:.2}s at 24 kHz)",
        speech_samples,
        speech_samples as f64 / 24000.0
    );
    Ok(())
}
