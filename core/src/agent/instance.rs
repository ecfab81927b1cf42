use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::config::AgentConfig;
use super::event_loop::EventLoop;
use super::state::{AgentState, StateMachine};
use super::task::TaskHandle;
use crate::backends::TranscriptionSession;
use crate::conversation::{ConversationHistory, Message};
use crate::job::Job;
use crate::metrics::{AgentMetrics, MetricsSnapshot};
use crate::{ParlanceError, Result};

/// Why [`VoiceAgent::start`] returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The job was shut down or timed out.
    JobEnded,
    /// [`VoiceAgent::close`] was called.
    Shutdown,
}

/// State shared between the caller-facing handle and the event loop.
pub(crate) struct AgentShared {
    pub(crate) config: AgentConfig,
    pub(crate) state: StateMachine,
    pub(crate) history: ConversationHistory,
    pub(crate) metrics: Arc<AgentMetrics>,
    pub(crate) shutdown: CancellationToken,
    /// Active transcription session.
    pub(crate) session: Mutex<Option<Arc<dyn TranscriptionSession>>>,
    /// Running transcription feeder.
    pub(crate) feeder: Mutex<Option<TaskHandle>>,
    interrupt_tx: mpsc::Sender<()>,
    interrupt_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl AgentShared {
    pub(crate) fn set_state(&self, from: AgentState, to: AgentState) -> Result<()> {
        self.state.transition(from, to)?;
        self.metrics.record_transition(from, to);
        info!(target: "agent", from = %from, to = %to, "State transition");
        Ok(())
    }

    /// Closes the active transcription session, if any.
    pub(crate) async fn release_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            if let Err(e) = session.close_send().await {
                debug!(target: "agent", error = %e, "Closing transcription session failed");
            }
        }
    }
}

/// A spoken-dialogue agent for one session.
///
/// ```rust,ignore
/// let agent = VoiceAgent::new(config);
/// let job = Job::new(&root, JobConfig { room_name: "lobby".into(), ..Default::default() })?;
/// let reason = agent.start(root.child_token(), &job).await?;
/// ```
pub struct VoiceAgent {
    shared: Arc<AgentShared>,
}

impl VoiceAgent {
    pub fn new(config: AgentConfig) -> Self {
        // Capacity one: at most a single interrupt is ever pending.
        let (interrupt_tx, interrupt_rx) = mpsc::channel(1);
        Self {
            shared: Arc::new(AgentShared {
                config,
                state: StateMachine::default(),
                history: ConversationHistory::new(),
                metrics: Arc::new(AgentMetrics::new()),
                shutdown: CancellationToken::new(),
                session: Mutex::new(None),
                feeder: Mutex::new(None),
                interrupt_tx,
                interrupt_rx: Mutex::new(Some(interrupt_rx)),
            }),
        }
    }

    /// Runs the conversation until `cancel` fires, the job ends, or
    /// [`close`](Self::close) is called. Collaborator failures end the
    /// session with a context-wrapped error.
    pub async fn start(&self, cancel: CancellationToken, job: &Job) -> Result<StopReason> {
        let interrupts = self
            .shared
            .interrupt_rx
            .lock()
            .take()
            .ok_or(ParlanceError::AlreadyStarted)?;
        let run = self.shared.shutdown.child_token();
        self.shared.metrics.mark_session_start();
        info!(
            target: "agent",
            job_id = %job.id(),
            room = %job.room_name(),
            language = %self.shared.config.language(),
            "Voice agent starting"
        );

        let vad_events = self
            .shared
            .config
            .vad
            .detect(self.shared.config.audio_in.subscribe(), run.child_token())
            .await;

        let outcome = match vad_events {
            Ok(vad_events) => {
                let mut event_loop =
                    EventLoop::new(Arc::clone(&self.shared), run.clone(), interrupts, vad_events);
                let outcome = event_loop.run(&cancel, job).await;
                event_loop.shutdown().await;
                outcome
            }
            Err(e) => Err(ParlanceError::context("failed to start VAD", e)),
        };

        run.cancel();
        self.shared.metrics.record_session_end();
        match &outcome {
            Ok(reason) => info!(target: "agent", reason = ?reason, "Voice agent stopped"),
            Err(e) => error!(target: "agent", error = %e, "Voice agent failed"),
        }
        outcome
    }

    /// Requests an interruption without waiting; redundant requests are dropped.
    pub fn interrupt(&self) {
        match self.shared.interrupt_tx.try_send(()) {
            Ok(()) => debug!(target: "agent", "Interrupt requested"),
            Err(TrySendError::Full(())) => debug!(target: "agent", "Interrupt already pending"),
            Err(TrySendError::Closed(())) => debug!(target: "agent", "Agent not running; interrupt dropped"),
        }
    }

    /// Stops the session and releases the active transcription session.
    /// Safe to call repeatedly and concurrently.
    pub async fn close(&self) {
        if !self.shared.shutdown.is_cancelled() {
            info!(target: "agent", "Voice agent closing");
        }
        self.shared.shutdown.cancel();
        self.shared.release_session().await;
    }

    pub fn state(&self) -> AgentState {
        self.shared.state.current()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub async fn history(&self) -> Vec<Message> {
        self.shared.history.snapshot().await
    }

    pub fn config(&self) -> &AgentConfig {
        &self.shared.config
    }
}
