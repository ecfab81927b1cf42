use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::{AudioFrame, AudioOutput, BackgroundAudio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Every synthesized frame was delivered.
    Completed { frames: usize },
    /// Stopped early; remaining frames were discarded.
    Cancelled { frames: usize },
    /// The outbound sink went away.
    SinkClosed { frames: usize },
}

/// Delivers synthesized frames to the outbound sink.
#[derive(Clone)]
pub struct SpeechStreamer {
    output: AudioOutput,
    background: Option<Arc<dyn BackgroundAudio>>,
}

impl SpeechStreamer {
    pub fn new(output: AudioOutput, background: Option<Arc<dyn BackgroundAudio>>) -> Self {
        Self { output, background }
    }

    fn prepare(&self, frame: AudioFrame) -> AudioFrame {
        match &self.background {
            Some(bg) if bg.is_enabled() => bg.mix(frame),
            _ => frame,
        }
    }

    pub async fn stream(
        &self,
        mut frames: BoxStream<'static, AudioFrame>,
        cancel: &CancellationToken,
    ) -> SpeechOutcome {
        let mut sent = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SpeechOutcome::Cancelled { frames: sent },
                next = frames.next() => next,
            };
            let Some(frame) = next else {
                debug!(target: "speech", frames = sent, "Synthesized stream exhausted");
                return SpeechOutcome::Completed { frames: sent };
            };
            let frame = self.prepare(frame);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SpeechOutcome::Cancelled { frames: sent },
                res = self.output.send(frame) => {
                    if res.is_err() {
                        warn!(target: "speech", frames = sent, "Outbound sink closed");
                        return SpeechOutcome::SinkClosed { frames: sent };
                    }
                    sent += 1;
                }
            }
        }
    }
}
