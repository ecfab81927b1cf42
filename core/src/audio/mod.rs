// Audio frames, endpoints and the pieces of signal handling the orchestrator owns

pub mod background;
pub mod frame;
pub mod vad;

pub use background::{mix_frames, scale_volume, BackgroundAudio, BackgroundConfig, LoopingBackground};
pub use frame::{AudioFrame, AudioInput, AudioOutput};
pub use vad::{EnergyVad, EnergyVadConfig};
