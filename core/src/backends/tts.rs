use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::audio::AudioFrame;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizeRequest {
    pub text: String,
    pub voice: String,
    pub language: String,
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Returns a lazy sequence of frames for `request.text`.
    async fn synthesize(&self, request: SynthesizeRequest) -> Result<BoxStream<'static, AudioFrame>>;
}
