use parlance_core::audio::{BackgroundConfig, EnergyVad, EnergyVadConfig};
use parlance_core::fake::{FakeTts, FixedTurnDetector, LlmStep, ScriptedLlm, ScriptedStt};
use parlance_core::{
    AgentConfig, AgentSettings, AudioFrame, AudioInput, FunctionTool, Job, JobConfig,
    LoopingBackground, ToolError, VoiceAgent,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const SAMPLE_RATE: u32 = 48_000;
const FRAME: Duration = Duration::from_millis(10);

/// 10 ms square-wave frame loud enough to trip the energy VAD.
fn tone_frame(amplitude: i16, timestamp: Duration) -> AudioFrame {
    let per_frame = (SAMPLE_RATE / 100) as usize;
    let samples: Vec<i16> = (0..per_frame)
        .map(|i| if (i / 48) % 2 == 0 { amplitude } else { -amplitude })
        .collect();
    AudioFrame::from_samples(&samples, SAMPLE_RATE, 1, timestamp)
}

/// Plays a fixed script of "utterances" (tone bursts separated by silence) in real time.
async fn synthetic_mic(mic: broadcast::Sender<AudioFrame>, cancel: CancellationToken) {
    // (voiced ms, silent ms) per utterance.
    let script = [(600u64, 4_000u64), (500, 4_000)];
    let mut ticker = tokio::time::interval(FRAME);
    let mut elapsed = Duration::ZERO;

    for (voiced, silent) in script {
        let frames = (voiced / 10, silent / 10);
        for i in 0..frames.0 + frames.1 {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let frame = if i < frames.0 {
                tone_frame(6_000, elapsed)
            } else {
                let mut silence = AudioFrame::silence(SAMPLE_RATE, 1, FRAME);
                silence.timestamp = elapsed;
                silence
            };
            elapsed += FRAME;
            // No receivers only means the agent has not subscribed yet.
            let _ = mic.send(frame);
        }
    }
    info!(target: "console_agent", "Microphone script finished");
}

fn weather_tool() -> FunctionTool {
    FunctionTool::new(
        "get_weather",
        "Current weather for a city",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
        |args, _cancel| async move {
            let args: Value = serde_json::from_str(&args)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
            let city = args
                .get("city")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArguments("missing city".into()))?;
            Ok(format!("{city}: Sunny, 22C"))
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    parlance_core::telemetry::init_logging("info,parlance_core=info,console_agent=info")?;
    info!(
        target: "console_agent",
        "Starting console demo: mic → VAD → STT → turn detection → LLM/tools → TTS"
    );

    let settings = AgentSettings::load();

    let (mic_tx, audio_in) = AudioInput::channel(512);
    let (audio_out, mut speaker) = mpsc::channel::<AudioFrame>(512);

    let stt = ScriptedStt::new("Thanks, that's all.").with_transcripts(["What's the weather in Paris?"]);
    let llm = ScriptedLlm::replying("You're welcome. Goodbye!")
        .then_call("get_weather", r#"{"city":"Paris"}"#)
        .then(LlmStep::Reply("It is sunny and 22 degrees in Paris.".into()))
        .with_delay(Duration::from_millis(150));
    let background = LoopingBackground::new(BackgroundConfig {
        frames: vec![tone_frame(800, Duration::ZERO)],
        volume: 0.1,
        enabled: true,
    });

    let config = AgentConfig::builder()
        .vad(Arc::new(EnergyVad::new(EnergyVadConfig::default())))
        .stt(Arc::new(stt))
        .llm(Arc::new(llm))
        .tts(Arc::new(FakeTts::new().with_frame_interval(FRAME)))
        .turn_detector(Arc::new(FixedTurnDetector::new(0.9, 0.85)))
        .audio_in(audio_in)
        .audio_out(audio_out)
        .background(Arc::new(background))
        .tool(Arc::new(weather_tool()))
        .settings(settings)
        .build()?;
    let agent = Arc::new(VoiceAgent::new(config));

    let root = CancellationToken::new();
    let job = Job::new(
        &root,
        JobConfig {
            room_name: "console".into(),
            timeout: Some(Duration::from_secs(12)),
            ..Default::default()
        },
    )?;
    info!(target: "console_agent", job_id = %job.id(), "Job created");

    let mic_task = tokio::spawn(synthetic_mic(mic_tx, root.child_token()));

    let speaker_task = tokio::spawn(async move {
        let mut frames = 0usize;
        let mut played = Duration::ZERO;
        while let Some(frame) = speaker.recv().await {
            frames += 1;
            played += frame.duration();
        }
        info!(
            target: "console_agent",
            frames,
            played_ms = played.as_millis() as u64,
            "Speaker drained"
        );
    });

    let interrupt_task = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!(target: "console_agent", "Ctrl+C received; closing agent");
                agent.close().await;
            }
        })
    };

    match agent.start(root.child_token(), &job).await {
        Ok(reason) => info!(target: "console_agent", reason = ?reason, "Session ended"),
        Err(e) => error!(target: "console_agent", error = %e, "Session failed"),
    }

    agent.close().await;
    root.cancel();
    interrupt_task.abort();
    let _ = interrupt_task.await;
    let _ = mic_task.await;

    for message in agent.history().await {
        println!("{:?}: {}", message.role, message.content);
    }
    println!("{}", serde_json::to_string_pretty(&agent.metrics())?);

    // The agent owns the outbound sender; dropping it ends the speaker task.
    drop(agent);
    let _ = speaker_task.await;
    Ok(())
}
