//! Scriptable in-process backends.
//!
//! They implement the collaborator traits deterministically and record how
//! they were called, for tests and for the console demo.

mod llm;
mod stt;
mod tts;
mod turn;
mod vad;

pub use llm::{LlmStep, ScriptedLlm};
pub use stt::ScriptedStt;
pub use tts::FakeTts;
pub use turn::FixedTurnDetector;
pub use vad::{ScriptedVad, VadScript};
