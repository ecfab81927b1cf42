//! Parlance core: the conversation state machine of a real-time spoken-dialogue agent.
//!
//! The crate sequences calls to pluggable speech and language backends
//! (voice-activity detection, transcription, language model, synthesis and
//! end-of-turn prediction) around a single cancelable event loop.

pub mod agent;
pub mod audio;
pub mod backends;
pub mod config;
pub mod conversation;
pub mod fake;
pub mod job;
pub mod metrics;
pub mod telemetry;
pub mod tools;

use thiserror::Error;

pub use agent::{AgentConfig, AgentConfigBuilder, AgentState, StopReason, VoiceAgent};
pub use audio::{AudioFrame, AudioInput, AudioOutput, BackgroundAudio, LoopingBackground};
pub use config::AgentSettings;
pub use conversation::{ConversationHistory, Message, Role};
pub use job::{Job, JobConfig};
pub use metrics::{AgentMetrics, MetricsSnapshot};
pub use tools::{FunctionTool, Tool, ToolError, ToolRegistry, ToolResult};

/// Errors surfaced by the orchestrator and its collaborators.
#[derive(Error, Debug)]
pub enum ParlanceError {
    #[error("Missing required component: {0}")]
    MissingComponent(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("VAD error: {0}")]
    Vad(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Turn detection error: {0}")]
    TurnDetection(String),

    #[error("Job error: {0}")]
    Job(String),

    #[error("Illegal state transition: {from} -> {to}")]
    IllegalTransition { from: AgentState, to: AgentState },

    #[error("Agent already started")]
    AlreadyStarted,

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ParlanceError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ParlanceError {
    /// Wraps `source` with a short description of what was being attempted.
    pub fn context(context: impl Into<String>, source: ParlanceError) -> Self {
        ParlanceError::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Innermost error of a context chain.
    pub fn root_cause(&self) -> &ParlanceError {
        match self {
            ParlanceError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParlanceError>;
