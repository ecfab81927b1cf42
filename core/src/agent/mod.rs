//! Conversation state machine and the background tasks it drives.
//! - state.rs: AgentState and the transition table
//! - task.rs: cancelable task handle shared by all background work
//! - turn.rs: end-of-turn detection loop
//! - feeder.rs: inbound audio → transcription session
//! - response.rs: bounded tool-calling response generation
//! - speech.rs: synthesized audio → outbound sink
//! - event_loop.rs: the single loop reacting to external events
//! - instance.rs: VoiceAgent, the caller-facing handle

mod config;
mod event_loop;
pub mod feeder;
mod instance;
pub mod response;
pub mod speech;
pub mod state;
pub mod task;
pub mod turn;

pub use config::{AgentConfig, AgentConfigBuilder};
pub use instance::{StopReason, VoiceAgent};
pub use response::{Response, ResponseGenerator};
pub use speech::{SpeechOutcome, SpeechStreamer};
pub use state::{AgentState, StateMachine, TransitionTable};
pub use task::TaskHandle;
pub use turn::{TurnDecision, TurnDetectionLoop, TurnEndReason};
