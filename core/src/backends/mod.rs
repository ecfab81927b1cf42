//! Call contracts of the external collaborators the orchestrator sequences.
//!
//! Every backend is a trait object (`Arc<dyn ...>`) so real engines and the
//! fakes in [`crate::fake`] plug in the same way.

pub mod llm;
pub mod stt;
pub mod tts;
pub mod turn;
pub mod vad;

pub use llm::{ChatRequest, ChatResponse, FunctionCall, FunctionDefinition, LanguageModel};
pub use stt::{SpeechEvent, SpeechToText, StreamConfig, TranscriptionSession, TranscriptionStream};
pub use tts::{SynthesizeRequest, TextToSpeech};
pub use turn::{ChatContext, TurnDetector};
pub use vad::{VadEvent, VadEventKind, VoiceActivityDetector};
