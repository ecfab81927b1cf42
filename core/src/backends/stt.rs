use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::audio::AudioFrame;
use crate::Result;

/// Audio format and language a transcription session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub num_channels: u16,
    pub language: String,
    pub max_retry: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    Interim { text: String },
    Final { text: String, confidence: f32 },
    Error { message: String },
}

/// Input half of an open transcription session.
#[async_trait]
pub trait TranscriptionSession: Send + Sync {
    async fn push(&self, frame: AudioFrame) -> Result<()>;

    /// Signals that no more audio follows; pending results are flushed to the event stream.
    async fn close_send(&self) -> Result<()>;
}

/// A freshly opened session: the push/close handle plus its event sequence.
pub struct TranscriptionStream {
    pub session: Arc<dyn TranscriptionSession>,
    pub events: BoxStream<'static, SpeechEvent>,
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn new_stream(&self, config: StreamConfig) -> Result<TranscriptionStream>;
}
