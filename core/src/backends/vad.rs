use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioFrame;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEventKind {
    SpeechStart,
    SpeechEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VadEvent {
    pub kind: VadEventKind,
    /// Detector confidence for this decision.
    pub probability: f32,
}

impl VadEvent {
    pub fn speech_start() -> Self {
        Self {
            kind: VadEventKind::SpeechStart,
            probability: 1.0,
        }
    }

    pub fn speech_end() -> Self {
        Self {
            kind: VadEventKind::SpeechEnd,
            probability: 1.0,
        }
    }
}

#[async_trait]
pub trait VoiceActivityDetector: Send + Sync {
    /// Starts detection over `audio`, yielding speech boundaries until the
    /// audio is exhausted or `cancel` fires.
    async fn detect(
        &self,
        audio: broadcast::Receiver<AudioFrame>,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, VadEvent>>;
}
