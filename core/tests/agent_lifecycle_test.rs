//! Construction, start/stop and concurrency guarantees of the voice agent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{join, HarnessBuilder};
use parlance_core::agent::AgentState;
use parlance_core::fake::{FakeTts, FixedTurnDetector, ScriptedLlm, ScriptedStt, ScriptedVad};
use parlance_core::{
    AgentConfig, AgentConfigBuilder, AudioFrame, AudioInput, FunctionTool, Job, JobConfig, ParlanceError,
    StopReason, VoiceAgent,
};
use serde_json::json;
use parlance_core::backends::VoiceActivityDetector;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Builder with every required part except `missing`.
fn builder_without(missing: &str) -> AgentConfigBuilder {
    let mut builder = AgentConfig::builder();
    if missing != "VAD" {
        builder = builder.vad(Arc::new(ScriptedVad::new().0));
    }
    if missing != "STT" {
        builder = builder.stt(Arc::new(ScriptedStt::new("hi")));
    }
    if missing != "LLM" {
        builder = builder.llm(Arc::new(ScriptedLlm::replying("hello")));
    }
    if missing != "TTS" {
        builder = builder.tts(Arc::new(FakeTts::new()));
    }
    if missing != "turn detector" {
        builder = builder.turn_detector(Arc::new(FixedTurnDetector::new(0.9, 0.85)));
    }
    if missing != "audio input" {
        builder = builder.audio_in(AudioInput::channel(8).1);
    }
    if missing != "audio output" {
        builder = builder.audio_out(mpsc::channel(8).0);
    }
    builder
}

/// Every required collaborator and endpoint is checked at construction.
#[test]
fn build_reports_each_missing_component() {
    for missing in [
        "VAD",
        "STT",
        "LLM",
        "TTS",
        "turn detector",
        "audio input",
        "audio output",
    ] {
        match builder_without(missing).build() {
            Err(ParlanceError::MissingComponent(name)) => assert_eq!(name, missing),
            other => panic!("expected missing {missing}, got {other:?}"),
        }
    }
    assert!(builder_without("none").build().is_ok());
}

#[test]
fn language_defaults_to_en_us_and_can_be_overridden() {
    let config = builder_without("none").build().unwrap();
    assert_eq!(config.language(), "en-US");

    let config = builder_without("none").language("fr-FR").build().unwrap();
    assert_eq!(config.language(), "fr-FR");
}

#[test]
fn duplicate_tool_names_fail_construction() {
    let tool = || {
        Arc::new(FunctionTool::new("get_weather", "", json!({}), |_a, _c| async move {
            Ok(String::new())
        }))
    };
    let err = builder_without("none")
        .tool(tool())
        .tool(tool())
        .build()
        .unwrap_err();
    assert!(matches!(err, ParlanceError::Config(_)), "{err:?}");
}

#[test]
fn new_agent_is_idle() {
    let agent = VoiceAgent::new(builder_without("none").build().unwrap());
    assert_eq!(agent.state(), AgentState::Idle);
    assert_eq!(agent.metrics().total_transitions(), 0);
}

/// Close may be called any number of times, concurrently, before or after start.
#[tokio::test]
async fn close_is_idempotent_and_concurrent() {
    let h = HarnessBuilder::new("hi", "hello").build();
    h.agent.close().await;
    h.agent.close().await;

    let closers: Vec<_> = (0..16)
        .map(|_| {
            let agent = Arc::clone(&h.agent);
            tokio::spawn(async move { agent.close().await })
        })
        .collect();
    for closer in closers {
        closer.await.unwrap();
    }

    // A closed agent stops immediately when started.
    let reason = join(h.spawn()).await.unwrap();
    assert_eq!(reason, StopReason::Shutdown);
}

#[tokio::test]
async fn close_ends_a_running_session_and_releases_stt() {
    let h = HarnessBuilder::new("hi", "hello").build();
    let task = h.spawn();
    h.vad.speech_start();
    h.wait_until("an STT session", |_| h.stt.sessions_opened() == 1)
        .await;
    assert_eq!(h.agent.state(), AgentState::Listening);

    h.agent.close().await;
    assert_eq!(join(task).await.unwrap(), StopReason::Shutdown);
    assert_eq!(h.stt.sessions_closed(), 1);
    h.agent.close().await;
    assert_eq!(h.stt.sessions_closed(), 1);
    assert!(h.agent.metrics().session_duration_ms.is_some());
}

#[tokio::test]
async fn cancellation_and_job_shutdown_are_reported() {
    let h = HarnessBuilder::new("hi", "hello").build();
    let task = h.spawn();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.root.cancel();
    let reason = join(task).await.unwrap();
    assert!(
        matches!(reason, StopReason::Cancelled | StopReason::JobEnded),
        "{reason:?}"
    );

    let h = HarnessBuilder::new("hi", "hello").build();
    let task = h.spawn();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.job.shutdown("room closed");
    assert_eq!(join(task).await.unwrap(), StopReason::JobEnded);
}

#[tokio::test]
async fn job_timeout_ends_session() {
    let h = HarnessBuilder::new("hi", "hello").build();
    let job = Job::new(
        &CancellationToken::new(),
        JobConfig {
            room_name: "short".into(),
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        },
    )
    .unwrap();
    let reason = tokio::time::timeout(
        Duration::from_secs(5),
        h.agent.start(CancellationToken::new(), &job),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reason, StopReason::JobEnded);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let h = HarnessBuilder::new("hi", "hello").build();
    let first = h.spawn();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = h
        .agent
        .start(CancellationToken::new(), &h.job)
        .await
        .unwrap_err();
    assert!(matches!(err, ParlanceError::AlreadyStarted));
    h.agent.close().await;
    join(first).await.unwrap();
}

#[tokio::test]
async fn vad_start_failure_ends_session_with_context() {
    let (vad, _script) = ScriptedVad::new();
    let vad = Arc::new(vad);
    // The scripted detector can only be started once.
    vad.detect(broadcast::channel(1).1, CancellationToken::new())
        .await
        .unwrap();

    let config = builder_without("VAD").vad(vad).build().unwrap();
    let agent = VoiceAgent::new(config);
    let job = Job::new(
        &CancellationToken::new(),
        JobConfig {
            room_name: "room".into(),
            ..Default::default()
        },
    )
    .unwrap();
    let err = agent.start(CancellationToken::new(), &job).await.unwrap_err();
    assert!(err.to_string().starts_with("failed to start VAD"), "{err}");
    assert!(matches!(err.root_cause(), ParlanceError::Vad(_)));
}

/// Interrupt never blocks, whatever the agent is doing.
#[tokio::test]
async fn interrupt_never_blocks() {
    let h = HarnessBuilder::new("hi", "hello").build();

    // Before start: fills the single slot, the rest are dropped.
    for _ in 0..100 {
        h.agent.interrupt();
    }

    let task = h.spawn();
    let callers: Vec<_> = (0..8)
        .map(|_| {
            let agent = Arc::clone(&h.agent);
            tokio::spawn(async move {
                for _ in 0..200 {
                    agent.interrupt();
                }
            })
        })
        .collect();
    for caller in callers {
        tokio::time::timeout(Duration::from_secs(1), caller)
            .await
            .expect("interrupt callers finished promptly")
            .unwrap();
    }
    // Interrupts while Idle are no-ops.
    assert_eq!(h.agent.state(), AgentState::Idle);

    h.agent.close().await;
    join(task).await.unwrap();
    // After the loop has gone away, interrupts are still harmless.
    h.agent.interrupt();
}

/// Mic traffic, interrupts, state reads and close all racing one another.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_do_not_race() {
    let h = HarnessBuilder::new("race test", "ok").build();
    let task = h.spawn();

    let mic = h.mic.clone();
    let feeder = tokio::spawn(async move {
        for _ in 0..50 {
            let _ = mic.send(AudioFrame::silence(48_000, 1, Duration::from_millis(10)));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let agent = Arc::clone(&h.agent);
    let interrupter = tokio::spawn(async move {
        for _ in 0..20 {
            agent.interrupt();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let agent = Arc::clone(&h.agent);
    let reader = tokio::spawn(async move {
        for _ in 0..100 {
            let _ = agent.state();
            let _ = agent.metrics();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    for _ in 0..3 {
        h.vad.utterance();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    for t in [feeder, interrupter, reader] {
        tokio::time::timeout(Duration::from_secs(5), t).await.unwrap().unwrap();
    }
    let agent = Arc::clone(&h.agent);
    let closer = tokio::spawn(async move { agent.close().await });
    h.agent.close().await;
    closer.await.unwrap();
    assert_eq!(join(task).await.unwrap(), StopReason::Shutdown);
}
