use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioFrame;
use crate::backends::{VadEvent, VoiceActivityDetector};
use crate::{ParlanceError, Result};

/// Detector whose events are pushed by a [`VadScript`] instead of derived from audio.
pub struct ScriptedVad {
    events: Mutex<Option<mpsc::UnboundedReceiver<VadEvent>>>,
}

/// Sending half of a [`ScriptedVad`].
#[derive(Clone)]
pub struct VadScript {
    tx: mpsc::UnboundedSender<VadEvent>,
}

impl ScriptedVad {
    pub fn new() -> (Self, VadScript) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: Mutex::new(Some(rx)),
            },
            VadScript { tx },
        )
    }
}

impl VadScript {
    pub fn speech_start(&self) {
        let _ = self.tx.send(VadEvent::speech_start());
    }

    pub fn speech_end(&self) {
        let _ = self.tx.send(VadEvent::speech_end());
    }

    /// A complete utterance: start followed by end.
    pub fn utterance(&self) {
        self.speech_start();
        self.speech_end();
    }
}

#[async_trait]
impl VoiceActivityDetector for ScriptedVad {
    async fn detect(
        &self,
        _audio: broadcast::Receiver<AudioFrame>,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, VadEvent>> {
        let rx = self
            .events
            .lock()
            .take()
            .ok_or_else(|| ParlanceError::Vad("detector already started".into()))?;
        Ok(UnboundedReceiverStream::new(rx)
            .take_until(cancel.cancelled_owned())
            .boxed())
    }
}
