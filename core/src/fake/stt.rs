use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::audio::AudioFrame;
use crate::backends::{SpeechEvent, SpeechToText, StreamConfig, TranscriptionSession, TranscriptionStream};
use crate::{ParlanceError, Result};

/// Transcriber that emits a scripted final transcript when a session is closed.
///
/// Each new session takes the next queued transcript; once the queue is
/// empty the default transcript is used.
pub struct ScriptedStt {
    transcripts: Mutex<VecDeque<String>>,
    default_transcript: String,
    fail_new_stream: AtomicBool,
    configs: Mutex<Vec<StreamConfig>>,
    frames: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedStt {
    pub fn new(default_transcript: impl Into<String>) -> Self {
        Self {
            transcripts: Mutex::new(VecDeque::new()),
            default_transcript: default_transcript.into(),
            fail_new_stream: AtomicBool::new(false),
            configs: Mutex::new(Vec::new()),
            frames: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_transcripts<I, S>(self, transcripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transcripts
            .lock()
            .extend(transcripts.into_iter().map(Into::into));
        self
    }

    /// Makes every subsequent `new_stream` call fail.
    pub fn fail_new_streams(&self) {
        self.fail_new_stream.store(true, Ordering::SeqCst);
    }

    pub fn sessions_opened(&self) -> usize {
        self.configs.lock().len()
    }

    pub fn stream_configs(&self) -> Vec<StreamConfig> {
        self.configs.lock().clone()
    }

    pub fn frames_pushed(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct ScriptedSession {
    transcript: String,
    events: Mutex<Option<mpsc::UnboundedSender<SpeechEvent>>>,
    frames: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl TranscriptionSession for ScriptedSession {
    async fn push(&self, _frame: AudioFrame) -> Result<()> {
        if self.events.lock().is_none() {
            return Err(ParlanceError::Stt("stream is closed".into()));
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close_send(&self) -> Result<()> {
        let events = self.events.lock().take();
        if let Some(events) = events {
            self.closes.fetch_add(1, Ordering::SeqCst);
            let _ = events.send(SpeechEvent::Final {
                text: self.transcript.clone(),
                confidence: 0.95,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn new_stream(&self, config: StreamConfig) -> Result<TranscriptionStream> {
        if self.fail_new_stream.load(Ordering::SeqCst) {
            return Err(ParlanceError::Stt("backend unavailable".into()));
        }
        self.configs.lock().push(config);
        let transcript = self
            .transcripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_transcript.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let session = ScriptedSession {
            transcript,
            events: Mutex::new(Some(tx)),
            frames: Arc::clone(&self.frames),
            closes: Arc::clone(&self.closes),
        };
        let events = UnboundedReceiverStream::new(rx).boxed();
        Ok(TranscriptionStream {
            session: Arc::new(session),
            events,
        })
    }
}
