use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioInput, AudioOutput, BackgroundAudio};
use crate::backends::{LanguageModel, SpeechToText, TextToSpeech, TurnDetector, VoiceActivityDetector};
use crate::config::AgentSettings;
use crate::tools::{Tool, ToolRegistry};
use crate::{ParlanceError, Result};

/// Everything one agent session needs; immutable once built.
pub struct AgentConfig {
    pub(crate) vad: Arc<dyn VoiceActivityDetector>,
    pub(crate) stt: Arc<dyn SpeechToText>,
    pub(crate) llm: Arc<dyn LanguageModel>,
    pub(crate) tts: Arc<dyn TextToSpeech>,
    pub(crate) turn_detector: Arc<dyn TurnDetector>,
    pub(crate) audio_in: AudioInput,
    pub(crate) audio_out: AudioOutput,
    pub(crate) background: Option<Arc<dyn BackgroundAudio>>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) settings: AgentSettings,
}

impl AgentConfig {
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    pub fn language(&self) -> &str {
        &self.settings.language
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("language", &self.settings.language)
            .field("tools", &self.tools.len())
            .field("background", &self.background.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct AgentConfigBuilder {
    vad: Option<Arc<dyn VoiceActivityDetector>>,
    stt: Option<Arc<dyn SpeechToText>>,
    llm: Option<Arc<dyn LanguageModel>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    turn_detector: Option<Arc<dyn TurnDetector>>,
    audio_in: Option<AudioInput>,
    audio_out: Option<AudioOutput>,
    background: Option<Arc<dyn BackgroundAudio>>,
    tools: Vec<Arc<dyn Tool>>,
    language: Option<String>,
    settings: Option<AgentSettings>,
}

impl AgentConfigBuilder {
    pub fn vad(mut self, vad: Arc<dyn VoiceActivityDetector>) -> Self {
        self.vad = Some(vad);
        self
    }

    pub fn stt(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.stt = Some(stt);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn tts(mut self, tts: Arc<dyn TextToSpeech>) -> Self {
        self.tts = Some(tts);
        self
    }

    pub fn turn_detector(mut self, detector: Arc<dyn TurnDetector>) -> Self {
        self.turn_detector = Some(detector);
        self
    }

    pub fn audio_in(mut self, input: AudioInput) -> Self {
        self.audio_in = Some(input);
        self
    }

    pub fn audio_out(mut self, output: AudioOutput) -> Self {
        self.audio_out = Some(output);
        self
    }

    pub fn background(mut self, background: Arc<dyn BackgroundAudio>) -> Self {
        self.background = Some(background);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Overrides `settings.language`.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<AgentConfig> {
        let vad = self.vad.ok_or(ParlanceError::MissingComponent("VAD"))?;
        let stt = self.stt.ok_or(ParlanceError::MissingComponent("STT"))?;
        let llm = self.llm.ok_or(ParlanceError::MissingComponent("LLM"))?;
        let tts = self.tts.ok_or(ParlanceError::MissingComponent("TTS"))?;
        let turn_detector = self
            .turn_detector
            .ok_or(ParlanceError::MissingComponent("turn detector"))?;
        let audio_in = self
            .audio_in
            .ok_or(ParlanceError::MissingComponent("audio input"))?;
        let audio_out = self
            .audio_out
            .ok_or(ParlanceError::MissingComponent("audio output"))?;

        let mut settings = self.settings.unwrap_or_default();
        if let Some(language) = self.language {
            settings.language = language;
        }
        settings.validate()?;

        let registry = ToolRegistry::with_timeout(Duration::from_millis(settings.response.tool_timeout_ms));
        for tool in self.tools {
            registry
                .register(tool)
                .map_err(|e| ParlanceError::Config(e.to_string()))?;
        }

        Ok(AgentConfig {
            vad,
            stt,
            llm,
            tts,
            turn_detector,
            audio_in,
            audio_out,
            background: self.background,
            tools: Arc::new(registry),
            settings,
        })
    }
}
