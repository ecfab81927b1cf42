//! Shared harness: an agent wired to the scripted fakes.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parlance_core::agent::AgentState;
use parlance_core::fake::{FakeTts, FixedTurnDetector, ScriptedLlm, ScriptedStt, ScriptedVad, VadScript};
use parlance_core::{
    AgentConfig, AgentSettings, AudioFrame, AudioInput, Job, JobConfig, Result, StopReason, Tool,
    VoiceAgent,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub agent: Arc<VoiceAgent>,
    pub vad: VadScript,
    pub stt: Arc<ScriptedStt>,
    pub llm: Arc<ScriptedLlm>,
    pub tts: Arc<FakeTts>,
    pub turn: Arc<FixedTurnDetector>,
    pub mic: broadcast::Sender<AudioFrame>,
    pub speaker: mpsc::Receiver<AudioFrame>,
    pub root: CancellationToken,
    pub job: Arc<Job>,
}

pub struct HarnessBuilder {
    stt: ScriptedStt,
    llm: ScriptedLlm,
    tts: FakeTts,
    turn: FixedTurnDetector,
    tools: Vec<Arc<dyn Tool>>,
    settings: AgentSettings,
}

impl HarnessBuilder {
    pub fn new(transcript: &str, reply: &str) -> Self {
        Self {
            stt: ScriptedStt::new(transcript),
            llm: ScriptedLlm::replying(reply),
            tts: FakeTts::new(),
            turn: FixedTurnDetector::new(0.9, 0.85),
            tools: Vec::new(),
            settings: AgentSettings::default(),
        }
    }

    pub fn stt(mut self, stt: ScriptedStt) -> Self {
        self.stt = stt;
        self
    }

    pub fn llm(mut self, llm: ScriptedLlm) -> Self {
        self.llm = llm;
        self
    }

    pub fn tts(mut self, tts: FakeTts) -> Self {
        self.tts = tts;
        self
    }

    pub fn turn(mut self, turn: FixedTurnDetector) -> Self {
        self.turn = turn;
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Harness {
        parlance_core::telemetry::init_test_logging();

        let (vad, script) = ScriptedVad::new();
        let stt = Arc::new(self.stt);
        let llm = Arc::new(self.llm);
        let tts = Arc::new(self.tts);
        let turn = Arc::new(self.turn);
        let (mic, audio_in) = AudioInput::channel(256);
        let (audio_out, speaker) = mpsc::channel(1024);

        let config = AgentConfig::builder()
            .vad(Arc::new(vad))
            .stt(stt.clone())
            .llm(llm.clone())
            .tts(tts.clone())
            .turn_detector(turn.clone())
            .audio_in(audio_in)
            .audio_out(audio_out)
            .tools(self.tools)
            .settings(self.settings)
            .build()
            .expect("valid config");

        let root = CancellationToken::new();
        let job = Job::new(
            &root,
            JobConfig {
                room_name: "test-room".into(),
                ..Default::default()
            },
        )
        .expect("valid job");

        Harness {
            agent: Arc::new(VoiceAgent::new(config)),
            vad: script,
            stt,
            llm,
            tts,
            turn,
            mic,
            speaker,
            root,
            job: Arc::new(job),
        }
    }
}

impl Harness {
    /// Runs `start` on a background task.
    pub fn spawn(&self) -> JoinHandle<Result<StopReason>> {
        let agent = Arc::clone(&self.agent);
        let job = Arc::clone(&self.job);
        let cancel = self.root.child_token();
        tokio::spawn(async move { agent.start(cancel, &job).await })
    }

    /// Polls until `check` holds, panicking after [`WAIT`].
    pub async fn wait_until<F>(&self, what: &str, check: F)
    where
        F: Fn(&VoiceAgent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !check(&self.agent) {
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {what}; state = {}", self.agent.state());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_for_state(&self, state: AgentState) {
        self.wait_until(&format!("state {state}"), |a| a.state() == state)
            .await;
    }

    /// Waits for `n` completed turns (Speaking → Idle transitions).
    pub async fn wait_for_turns(&self, n: u64) {
        self.wait_until(&format!("{n} completed turns"), |a| {
            a.metrics().transitions(AgentState::Speaking, AgentState::Idle) >= n
        })
        .await;
    }

    /// Frames currently buffered on the outbound sink.
    pub fn drain_speaker(&mut self) -> usize {
        let mut n = 0;
        while self.speaker.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

/// Awaits the agent task with a bound.
pub async fn join(handle: JoinHandle<Result<StopReason>>) -> Result<StopReason> {
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("agent stopped in time")
        .expect("agent task did not panic")
}
