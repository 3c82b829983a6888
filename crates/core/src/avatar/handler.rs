//! Session handler driving the avatar render pipeline

use std::sync::Arc;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::algorithm::{create_algorithm, AvatarAlgorithm};
use super::circuit_breaker::CircuitBreakerConfig;
use super::model::{AudioResult, AvatarInitOption, AvatarStatus, SpeechAudio, VideoResult};
use super::output::AvatarOutputHandler;
use super::processor::AvatarProcessor;
use crate::config::{EngineConfig, HandlerConfig};
use crate::data::{
    ChatData, ChatDataType, DataBundle, DataBundleDefinition, DataBundleEntry, EventType, ShapeDim,
};
use crate::handler::{
    DataInfoMap, Handler, HandlerContext, HandlerDataInfo, HandlerDetail, HandlerInfo,
    HandlerOutput, HandlerResult, HandlerState,
};
use crate::session::{DataSubmitter, SessionContext};
use crate::{submit_handler, Error, Result};

/// Metadata key grouping audio and frames of one avatar turn
pub const META_SPEECH_ID: &str = "speech_id";
/// Metadata key marking the last audio chunk of a turn
pub const META_SPEECH_END: &str = "avatar_speech_end";
/// Metadata key carrying the avatar status of a video frame
pub const META_AVATAR_STATUS: &str = "avatar_status";

/// Runs last, after every handler feeding it audio
pub const AVATAR_LOAD_PRIORITY: i32 = -999;

/// `avatar` handler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarHandlerConfig {
    pub avatar_name: String,
    pub algorithm: String,
    pub fps: u32,
    /// Playback rate of the rendered audio
    pub audio_sample_rate: u32,
    pub enable_fast_mode: bool,
    pub use_gpu: bool,
    pub debug: bool,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for AvatarHandlerConfig {
    fn default() -> Self {
        Self {
            avatar_name: "sample_data".to_string(),
            algorithm: "sample".to_string(),
            fps: 25,
            audio_sample_rate: 24000,
            enable_fast_mode: false,
            use_gpu: false,
            debug: false,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl AvatarHandlerConfig {
    pub fn init_option(&self) -> AvatarInitOption {
        AvatarInitOption {
            audio_sample_rate: self.audio_sample_rate,
            video_frame_rate: self.fps,
            avatar_name: self.avatar_name.clone(),
            debug: self.debug,
            enable_fast_mode: self.enable_fast_mode,
            use_gpu: self.use_gpu,
        }
    }
}

/// Renders `avatar_audio` into `avatar_video` plus paced `avatar_audio`
#[derive(Default)]
pub struct AvatarHandler {
    config: AvatarHandlerConfig,
    algorithm: Option<Arc<dyn AvatarAlgorithm>>,
}

submit_handler!("avatar", AvatarHandler);

struct AvatarContext {
    processor: AvatarProcessor,
    video_definition: Arc<DataBundleDefinition>,
    audio_definition: Arc<DataBundleDefinition>,
}

impl AvatarHandler {
    pub fn config(&self) -> &AvatarHandlerConfig {
        &self.config
    }

    fn output_definitions(
        config: &AvatarHandlerConfig,
    ) -> Result<(Arc<DataBundleDefinition>, Arc<DataBundleDefinition>)> {
        let video_entry = DataBundleEntry::framed(
            "avatar_video",
            vec![ShapeDim::var(), ShapeDim::var(), ShapeDim::var(), ShapeDim::Fixed(3)],
            0,
            config.fps,
            None,
            None,
        )?;
        let mut video = DataBundleDefinition::with_entry(video_entry)?;
        let mut audio = DataBundleDefinition::with_entry(DataBundleEntry::audio(
            "avatar_audio",
            1,
            config.audio_sample_rate,
        ))?;
        Ok((video.lockdown(), audio.lockdown()))
    }
}

impl Handler for AvatarHandler {
    fn info(&self) -> HandlerInfo {
        HandlerInfo::new("avatar").with_load_priority(AVATAR_LOAD_PRIORITY)
    }

    fn load(&mut self, _engine_config: &EngineConfig, handler_config: &HandlerConfig) -> Result<()> {
        self.config = handler_config.parse_params()?;
        self.algorithm = Some(create_algorithm(&self.config.algorithm)?);
        info!(
            "Avatar handler loaded: algorithm {}, avatar {}, {} fps",
            self.config.algorithm, self.config.avatar_name, self.config.fps
        );
        Ok(())
    }

    fn create_context(
        &self,
        session: &Arc<SessionContext>,
        _handler_config: &HandlerConfig,
    ) -> Result<HandlerState> {
        let algorithm = self
            .algorithm
            .clone()
            .ok_or_else(|| Error::InvalidState("avatar handler used before load".to_string()))?;
        let processor = AvatarProcessor::new(
            algorithm,
            self.config.init_option(),
            self.config.circuit_breaker,
        )?;
        let (video_definition, audio_definition) = Self::output_definitions(&self.config)?;
        debug!("Session {}: avatar context created", session.session_id());
        Ok(Box::new(AvatarContext {
            processor,
            video_definition,
            audio_definition,
        }))
    }

    fn handler_detail(&self, _session: &SessionContext, context: &HandlerContext) -> HandlerDetail {
        let detail = HandlerDetail::default().with_input(HandlerDataInfo::new(ChatDataType::AvatarAudio));
        match context.state::<AvatarContext>() {
            Ok(ctx) => detail
                .with_output(
                    HandlerDataInfo::new(ChatDataType::AvatarVideo)
                        .with_definition(Arc::clone(&ctx.video_definition)),
                )
                .with_output(
                    HandlerDataInfo::new(ChatDataType::AvatarAudio)
                        .with_definition(Arc::clone(&ctx.audio_definition)),
                ),
            Err(e) => {
                warn!("Session {}: {}", context.session_id(), e);
                detail
            }
        }
    }

    fn start_context(&self, _session: &Arc<SessionContext>, context: &mut HandlerContext) -> Result<()> {
        let submitter = context
            .submitter()
            .cloned()
            .ok_or_else(|| Error::InvalidState("avatar context started without submitter".to_string()))?;
        let ctx = context.state::<AvatarContext>()?;
        ctx.processor.register_output_handler(Arc::new(SessionOutput {
            submitter,
            video_definition: Arc::clone(&ctx.video_definition),
            audio_definition: Arc::clone(&ctx.audio_definition),
        }));
        ctx.processor.start()
    }

    fn handle(
        &self,
        context: &mut HandlerContext,
        input: ChatData,
        _outputs: &DataInfoMap,
    ) -> Result<HandlerOutput> {
        if input.data_type != ChatDataType::AvatarAudio {
            return Ok(HandlerOutput::empty());
        }
        let ctx = context.state::<AvatarContext>()?;
        let bundle = &input.data;
        if bundle
            .events()
            .iter()
            .any(|e| e.event_type == EventType::InterruptSpeech)
        {
            ctx.processor.interrupt();
        }

        let speech_id = bundle.meta_str(META_SPEECH_ID).unwrap_or_default().to_string();
        let end_of_speech = bundle.meta_bool(META_SPEECH_END, false);
        let sample_rate = bundle
            .definition()
            .main_entry()
            .map(|entry| entry.sample_rate)
            .unwrap_or(self.config.audio_sample_rate);
        let samples = match bundle.get_main_data().and_then(|v| v.as_array()) {
            Some(array) => {
                let mut samples = array.to_pcm16()?;
                if let [channels, len] = array.shape() {
                    if *channels > 1 {
                        debug!("Speech {}: keeping first of {} channels", speech_id, channels);
                        samples.truncate(*len);
                    }
                }
                samples
            }
            None => Vec::new(),
        };
        if samples.is_empty() && !end_of_speech {
            return Ok(HandlerOutput::empty());
        }

        let queued = ctx.processor.add_audio(
            SpeechAudio::new(speech_id, sample_rate, samples).with_end_of_speech(end_of_speech),
        )?;
        debug!("Session {}: {} avatar slices queued", context.session_id(), queued);
        Ok(HandlerOutput::empty())
    }

    fn destroy_context(&self, context: HandlerContext) {
        let session_id = context.session_id().to_string();
        match context.into_state().downcast::<AvatarContext>() {
            Ok(ctx) => {
                ctx.processor.stop();
                debug!("Session {}: avatar context destroyed", session_id);
            }
            Err(_) => warn!("Session {}: unexpected avatar context type", session_id),
        }
    }
}

/// Delivers rendered frames into the session
struct SessionOutput {
    submitter: DataSubmitter,
    video_definition: Arc<DataBundleDefinition>,
    audio_definition: Arc<DataBundleDefinition>,
}

impl SessionOutput {
    fn submit(&self, data_type: ChatDataType, bundle: DataBundle) {
        let result = self
            .submitter
            .submit(HandlerResult::Envelope(ChatData::new(data_type, bundle)));
        if let Err(e) = result {
            debug!("Avatar {} dropped: {}", data_type, e);
        }
    }
}

impl AvatarOutputHandler for SessionOutput {
    fn on_audio(&self, audio: AudioResult) {
        let len = audio.frame.samples.len();
        let array = match Array2::from_shape_vec((1, len), audio.frame.samples) {
            Ok(array) => array,
            Err(e) => {
                warn!("Avatar audio frame dropped: {}", e);
                return;
            }
        };
        let mut bundle = DataBundle::new(&self.audio_definition);
        if let Err(e) = bundle.set_main_data(array) {
            warn!("Avatar audio frame dropped: {}", e);
            return;
        }
        bundle.add_meta(META_SPEECH_ID, audio.speech_id);
        bundle.add_meta(META_SPEECH_END, audio.end_of_speech);
        self.submit(ChatDataType::AvatarAudio, bundle);
    }

    fn on_video(&self, video: VideoResult) {
        let image = video.frame.image.insert_axis(Axis(0));
        let mut bundle = DataBundle::new(&self.video_definition);
        if let Err(e) = bundle.set_main_data(image) {
            warn!("Avatar video frame dropped: {}", e);
            return;
        }
        bundle.add_meta(META_SPEECH_ID, video.speech_id);
        bundle.add_meta(META_AVATAR_STATUS, video.avatar_status.to_string());
        self.submit(ChatDataType::AvatarVideo, bundle);
    }

    fn on_avatar_status_change(&self, speech_id: &str, status: AvatarStatus) {
        info!("Avatar status changed to {} (speech '{}')", status, speech_id);
        if status == AvatarStatus::Listening {
            self.submitter.session().shared_states.set_enable_vad(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionInfo;

    fn loaded(params: &[(&str, serde_json::Value)]) -> AvatarHandler {
        let mut config = HandlerConfig::for_module("avatar");
        for (k, v) in params {
            config = config.with_param(*k, v.clone());
        }
        let mut handler = AvatarHandler::default();
        handler.load(&EngineConfig::default(), &config).unwrap();
        handler
    }

    #[test]
    fn test_info_and_config() {
        let handler = loaded(&[("fps", 30.into()), ("audio_sample_rate", 16000.into())]);
        assert_eq!(handler.info().load_priority, AVATAR_LOAD_PRIORITY);
        assert_eq!(handler.config().fps, 30);
        assert_eq!(handler.config().algorithm, "sample");
    }

    #[test]
    fn test_unknown_algorithm_fails_load() {
        let mut handler = AvatarHandler::default();
        let config = HandlerConfig::for_module("avatar").with_param("algorithm", "nope");
        assert!(handler.load(&EngineConfig::default(), &config).is_err());
    }

    #[test]
    fn test_detail_declares_outputs() {
        let handler = loaded(&[]);
        let session = Arc::new(SessionContext::new(SessionInfo::new("s")));
        let state = handler
            .create_context(&session, &HandlerConfig::default())
            .unwrap();
        let context = HandlerContext::new("s", "avatar", state);
        let detail = handler.handler_detail(&session, &context);
        assert!(detail.inputs.contains_key(&ChatDataType::AvatarAudio));
        let video = &detail.outputs[&ChatDataType::AvatarVideo];
        let entry = video.definition.as_ref().unwrap().main_entry().unwrap();
        assert_eq!(entry.sample_rate, 25);
        let audio = &detail.outputs[&ChatDataType::AvatarAudio];
        let entry = audio.definition.as_ref().unwrap().main_entry().unwrap();
        assert_eq!(entry.sample_rate, 24000);
        handler.destroy_context(context);
    }
}
