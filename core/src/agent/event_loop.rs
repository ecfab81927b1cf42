use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::feeder::spawn_feeder;
use super::instance::{AgentShared, StopReason};
use super::response::{Response, ResponseGenerator};
use super::speech::{SpeechOutcome, SpeechStreamer};
use super::state::AgentState;
use super::task::TaskHandle;
use super::turn::{TurnDecision, TurnDetectionLoop};
use crate::backends::{
    SpeechEvent, StreamConfig, SynthesizeRequest, TranscriptionStream, VadEvent, VadEventKind,
};
use crate::conversation::Message;
use crate::job::Job;
use crate::{ParlanceError, Result};

/// Completion reports from background tasks, tagged with the id of the
/// task that produced them so stale reports can be discarded.
enum Signal {
    TurnEnded { task: u64, decision: TurnDecision },
    ResponseReady { task: u64, response: Response },
    ResponseFailed { task: u64, error: ParlanceError },
    SpeechFinished { task: u64, outcome: SpeechOutcome },
}

type Slot = Option<(u64, TaskHandle)>;

fn owns(slot: &Slot, task: u64) -> bool {
    matches!(slot, Some((id, _)) if *id == task)
}

async fn stop_slot(slot: Slot, bound: Duration) {
    if let Some((_, handle)) = slot {
        handle.stop(bound).await;
    }
}

async fn next_event<T>(events: &mut Option<BoxStream<'static, T>>) -> Option<T> {
    match events {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

pub(crate) struct EventLoop {
    shared: Arc<AgentShared>,
    run: CancellationToken,
    interrupts: mpsc::Receiver<()>,
    vad_events: Option<BoxStream<'static, VadEvent>>,
    speech_events: Option<BoxStream<'static, SpeechEvent>>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    next_task: u64,
    turn_task: Slot,
    responder: Slot,
    speaker: Slot,
    generator: ResponseGenerator,
    streamer: SpeechStreamer,
}

impl EventLoop {
    pub(crate) fn new(
        shared: Arc<AgentShared>,
        run: CancellationToken,
        interrupts: mpsc::Receiver<()>,
        vad_events: BoxStream<'static, VadEvent>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let generator = ResponseGenerator::new(
            Arc::clone(&shared.config.llm),
            Arc::clone(&shared.config.tools),
            shared.history.clone(),
            shared.config.settings.response.max_tool_calls,
        );
        let streamer = SpeechStreamer::new(shared.config.audio_out.clone(), shared.config.background.clone());
        Self {
            shared,
            run,
            interrupts,
            vad_events: Some(vad_events),
            speech_events: None,
            signal_tx,
            signal_rx,
            next_task: 0,
            turn_task: None,
            responder: None,
            speaker: None,
            generator,
            streamer,
        }
    }

    fn task_bound(&self) -> Duration {
        self.shared.config.settings.tasks.task_stop_timeout()
    }

    fn feeder_bound(&self) -> Duration {
        self.shared.config.settings.tasks.feeder_stop_timeout()
    }

    fn next_task_id(&mut self) -> u64 {
        self.next_task += 1;
        self.next_task
    }

    pub(crate) async fn run(&mut self, cancel: &CancellationToken, job: &Job) -> Result<StopReason> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                _ = job.done() => return Ok(StopReason::JobEnded),
                _ = self.shared.shutdown.cancelled() => return Ok(StopReason::Shutdown),
                Some(()) = self.interrupts.recv() => {
                    self.handle_interrupt()
                        .await
                        .map_err(|e| ParlanceError::context("interrupt handling failed", e))?;
                }
                event = next_event(&mut self.vad_events) => match event {
                    Some(event) => self
                        .handle_vad_event(event)
                        .await
                        .map_err(|e| ParlanceError::context("VAD event handling failed", e))?,
                    None => {
                        warn!(target: "agent", "VAD event stream ended");
                        self.vad_events = None;
                    }
                },
                event = next_event(&mut self.speech_events) => match event {
                    Some(event) => self
                        .handle_speech_event(event)
                        .await
                        .map_err(|e| ParlanceError::context("STT event handling failed", e))?,
                    None => {
                        debug!(target: "agent", "Transcription event stream ended");
                        self.speech_events = None;
                    }
                },
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal).await?,
            }
        }
    }

    /// Stops every background task and releases the transcription session.
    pub(crate) async fn shutdown(&mut self) {
        let bound = self.task_bound();
        stop_slot(self.turn_task.take(), bound).await;
        stop_slot(self.responder.take(), bound).await;
        stop_slot(self.speaker.take(), bound).await;
        let feeder = self.shared.feeder.lock().take();
        if let Some(feeder) = feeder {
            feeder.stop(self.feeder_bound()).await;
        }
        self.shared.release_session().await;
        self.run.cancel();
    }

    async fn handle_interrupt(&mut self) -> Result<()> {
        let state = self.shared.state.current();
        match state {
            AgentState::Speaking | AgentState::Thinking => {
                info!(target: "agent", state = %state, "Interrupting");
                let bound = self.task_bound();
                stop_slot(self.speaker.take(), bound).await;
                stop_slot(self.responder.take(), bound).await;
                self.shared.set_state(state, AgentState::Listening)?;
                self.start_listening().await
            }
            AgentState::Idle | AgentState::Listening => {
                debug!(target: "agent", state = %state, "Interrupt ignored");
                Ok(())
            }
        }
    }

    async fn handle_vad_event(&mut self, event: VadEvent) -> Result<()> {
        let state = self.shared.state.current();
        match (event.kind, state) {
            (VadEventKind::SpeechStart, AgentState::Idle) => {
                self.shared.set_state(AgentState::Idle, AgentState::Listening)?;
                self.start_listening().await
            }
            (VadEventKind::SpeechStart, AgentState::Listening) => {
                if self.turn_task.is_some() {
                    debug!(target: "agent", "Speech resumed; cancelling turn detection");
                    stop_slot(self.turn_task.take(), self.task_bound()).await;
                }
                Ok(())
            }
            (VadEventKind::SpeechStart, AgentState::Speaking) => {
                info!(target: "agent", "Barge-in detected");
                self.handle_interrupt().await
            }
            (VadEventKind::SpeechEnd, AgentState::Listening) => {
                self.begin_turn_detection().await;
                Ok(())
            }
            (kind, state) => {
                trace!(target: "agent", kind = ?kind, state = %state, "VAD event ignored");
                Ok(())
            }
        }
    }

    async fn handle_speech_event(&mut self, event: SpeechEvent) -> Result<()> {
        match event {
            SpeechEvent::Final { text, confidence } => {
                let state = self.shared.state.current();
                if state != AgentState::Thinking {
                    debug!(target: "agent", state = %state, "Final transcript outside Thinking ignored");
                    return Ok(());
                }
                info!(target: "agent", transcript = %text, confidence, "Final transcript");
                self.shared.history.append(Message::user(text.clone())).await;
                if self.responder.is_some() {
                    debug!(target: "agent", "Response already in progress");
                    return Ok(());
                }
                self.spawn_response(text);
                Ok(())
            }
            SpeechEvent::Interim { text } => {
                trace!(target: "agent", transcript = %text, "Interim transcript");
                Ok(())
            }
            SpeechEvent::Error { message } => {
                warn!(target: "agent", error = %message, "Transcription error event");
                Ok(())
            }
        }
    }

    async fn handle_signal(&mut self, signal: Signal) -> Result<()> {
        match signal {
            Signal::TurnEnded { task, decision } => {
                if !owns(&self.turn_task, task) {
                    debug!(target: "agent", task, "Stale turn decision dropped");
                    return Ok(());
                }
                self.turn_task = None;
                if self.shared.state.current() != AgentState::Listening {
                    return Ok(());
                }
                debug!(target: "agent", reason = %decision.reason, "Turn ended");
                self.shared.set_state(AgentState::Listening, AgentState::Thinking)?;
                self.start_thinking().await;
                Ok(())
            }
            Signal::ResponseReady { task, response } => {
                if !owns(&self.responder, task) {
                    debug!(target: "agent", task, "Stale response dropped");
                    return Ok(());
                }
                self.responder = None;
                if self.shared.state.current() != AgentState::Thinking {
                    return Ok(());
                }
                self.shared.set_state(AgentState::Thinking, AgentState::Speaking)?;
                self.start_speaking(response.text).await
            }
            Signal::ResponseFailed { task, error } => {
                if !owns(&self.responder, task) {
                    return Ok(());
                }
                self.responder = None;
                Err(ParlanceError::context("response generation failed", error))
            }
            Signal::SpeechFinished { task, outcome } => {
                if !owns(&self.speaker, task) {
                    debug!(target: "agent", task, "Stale speech completion dropped");
                    return Ok(());
                }
                self.speaker = None;
                debug!(target: "agent", outcome = ?outcome, "Speech finished");
                if self.shared.state.current() == AgentState::Speaking {
                    self.shared.set_state(AgentState::Speaking, AgentState::Idle)?;
                }
                Ok(())
            }
        }
    }

    /// Replaces the feeder and transcription session for a new utterance.
    async fn start_listening(&mut self) -> Result<()> {
        stop_slot(self.turn_task.take(), self.task_bound()).await;

        let previous = self.shared.feeder.lock().take();
        if let Some(feeder) = previous {
            if !feeder.stop(self.feeder_bound()).await {
                warn!(target: "agent", "Previous feeder did not stop in time");
            }
        }
        self.shared.release_session().await;
        self.speech_events = None;

        let settings = &self.shared.config.settings;
        let stream_config = StreamConfig {
            sample_rate: settings.transcription.sample_rate,
            num_channels: settings.transcription.num_channels,
            language: settings.language.clone(),
            max_retry: settings.transcription.max_retry,
        };
        let TranscriptionStream { session, events } = self
            .shared
            .config
            .stt
            .new_stream(stream_config)
            .await
            .map_err(|e| ParlanceError::context("failed to create STT stream", e))?;

        *self.shared.session.lock() = Some(Arc::clone(&session));
        self.speech_events = Some(events);
        let feeder = spawn_feeder(session, self.shared.config.audio_in.subscribe(), &self.run);
        *self.shared.feeder.lock() = Some(feeder);
        Ok(())
    }

    /// Stops the feeder, then closes the session so it flushes its final transcript.
    async fn start_thinking(&mut self) {
        let feeder = self.shared.feeder.lock().take();
        if let Some(feeder) = feeder {
            if !feeder.stop(self.feeder_bound()).await {
                warn!(target: "agent", "Feeder did not stop in time; closing session anyway");
            }
        }
        let session = self.shared.session.lock().take();
        if let Some(session) = session {
            if let Err(e) = session.close_send().await {
                warn!(target: "agent", error = %e, "Closing transcription session failed");
            }
        }
    }

    async fn begin_turn_detection(&mut self) {
        stop_slot(self.turn_task.take(), self.task_bound()).await;

        let id = self.next_task_id();
        let detector = TurnDetectionLoop::new(
            Arc::clone(&self.shared.config.turn_detector),
            self.shared.history.clone(),
            self.shared.config.settings.language.clone(),
            self.shared.config.settings.turn.clone(),
            Arc::clone(&self.shared.metrics),
        );
        let signals = self.signal_tx.clone();
        let handle = TaskHandle::spawn("turn", &self.run, move |cancel| async move {
            if let Some(decision) = detector.run(cancel).await {
                let _ = signals.send(Signal::TurnEnded { task: id, decision });
            }
        });
        self.turn_task = Some((id, handle));
    }

    fn spawn_response(&mut self, transcript: String) {
        let id = self.next_task_id();
        let generator = self.generator.clone();
        let signals = self.signal_tx.clone();
        let handle = TaskHandle::spawn("response", &self.run, move |cancel| async move {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                res = generator.generate(&transcript, &cancel) => match res {
                    Ok(response) => Signal::ResponseReady { task: id, response },
                    Err(error) => Signal::ResponseFailed { task: id, error },
                },
            };
            let _ = signals.send(signal);
        });
        self.responder = Some((id, handle));
    }

    async fn start_speaking(&mut self, text: String) -> Result<()> {
        if let Some(latency) = self.shared.metrics.record_first_word() {
            info!(target: "speech", latency_ms = latency.as_millis() as u64, "First word");
        }

        let settings = &self.shared.config.settings;
        let request = SynthesizeRequest {
            text,
            voice: settings.voice.clone(),
            language: settings.language.clone(),
        };
        let frames = self
            .shared
            .config
            .tts
            .synthesize(request)
            .await
            .map_err(|e| ParlanceError::context("TTS synthesis failed", e))?;

        let id = self.next_task_id();
        let streamer = self.streamer.clone();
        let signals = self.signal_tx.clone();
        let handle = TaskHandle::spawn("speech", &self.run, move |cancel| async move {
            let outcome = streamer.stream(frames, &cancel).await;
            if !matches!(outcome, SpeechOutcome::Cancelled { .. }) {
                let _ = signals.send(Signal::SpeechFinished { task: id, outcome });
            }
        });
        self.speaker = Some((id, handle));
        Ok(())
    }
}
