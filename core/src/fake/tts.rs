use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use crate::audio::AudioFrame;
use crate::backends::{SynthesizeRequest, TextToSpeech};
use crate::{ParlanceError, Result};

/// Synthesizer producing one 10 ms tone frame per word of text.
pub struct FakeTts {
    sample_rate: u32,
    frame_interval: Duration,
    fail: AtomicBool,
    requests: Mutex<Vec<SynthesizeRequest>>,
}

impl Default for FakeTts {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTts {
    pub fn new() -> Self {
        Self {
            sample_rate: 48_000,
            frame_interval: Duration::ZERO,
            fail: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Paces frame production like a real-time synthesizer.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn fail_synthesis(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<SynthesizeRequest> {
        self.requests.lock().clone()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.text.clone()).collect()
    }

    /// Number of frames synthesized for `text`.
    pub fn frame_count(text: &str) -> usize {
        text.split_whitespace().count().max(1)
    }

    fn frame(&self, index: usize) -> AudioFrame {
        let per_channel = (self.sample_rate / 100) as usize;
        let samples: Vec<i16> = (0..per_channel)
            .map(|i| if (i / 24) % 2 == 0 { 4000 } else { -4000 })
            .collect();
        AudioFrame::from_samples(
            &samples,
            self.sample_rate,
            1,
            Duration::from_millis(10 * index as u64),
        )
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(&self, request: SynthesizeRequest) -> Result<BoxStream<'static, AudioFrame>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ParlanceError::Tts("voice unavailable".into()));
        }
        let frames: Vec<AudioFrame> = (0..Self::frame_count(&request.text))
            .map(|i| self.frame(i))
            .collect();
        self.requests.lock().push(request);

        let interval = self.frame_interval;
        if interval.is_zero() {
            return Ok(stream::iter(frames).boxed());
        }
        Ok(stream::iter(frames)
            .then(move |frame| async move {
                tokio::time::sleep(interval).await;
                frame
            })
            .boxed())
    }
}
