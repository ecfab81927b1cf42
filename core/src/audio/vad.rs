//! Energy-threshold voice activity detector.
//!
//! A frame counts as voiced when its RMS level reaches `threshold`. Speech
//! starts after `min_start_ms` of consecutive voiced audio and ends once the
//! hangover window has elapsed without voice.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::frame::AudioFrame;
use crate::backends::{VadEvent, VadEventKind, VoiceActivityDetector};
use crate::Result;

#[derive(Debug, Clone)]
pub struct EnergyVadConfig {
    pub threshold: f32,
    pub min_start_ms: u32,
    pub hangover_ms: u32,
}

impl Default for EnergyVadConfig {
    fn default() -> Self {
        let threshold = std::env::var("VAD_THRESHOLD")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(0.02);
        let min_start_ms = std::env::var("VAD_MIN_START_MS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(60);
        let hangover_ms = std::env::var("VAD_HANGOVER_MS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(300);
        Self {
            threshold,
            min_start_ms,
            hangover_ms,
        }
    }
}

pub struct EnergyVad {
    cfg: EnergyVadConfig,
}

impl EnergyVad {
    pub fn new(cfg: EnergyVadConfig) -> Self {
        Self { cfg }
    }
}

/// Frame-by-frame speech gate.
#[derive(Debug)]
struct Gate {
    cfg: EnergyVadConfig,
    in_speech: bool,
    voiced_ms: u32,
    hangover_left_ms: i64,
}

impl Gate {
    fn new(cfg: EnergyVadConfig) -> Self {
        Self {
            cfg,
            in_speech: false,
            voiced_ms: 0,
            hangover_left_ms: 0,
        }
    }

    fn observe(&mut self, frame: &AudioFrame) -> Option<VadEvent> {
        let frame_ms = frame.duration().as_millis() as u32;
        let level = frame.rms();
        let is_speech = level >= self.cfg.threshold;

        if is_speech {
            self.voiced_ms = self.voiced_ms.saturating_add(frame_ms);
            self.hangover_left_ms = self.cfg.hangover_ms as i64;
        } else {
            self.voiced_ms = 0;
            if self.in_speech {
                self.hangover_left_ms -= frame_ms as i64;
            }
        }

        if !self.in_speech && self.voiced_ms >= self.cfg.min_start_ms {
            self.in_speech = true;
            return Some(VadEvent {
                kind: VadEventKind::SpeechStart,
                probability: level.min(1.0),
            });
        }
        if self.in_speech && !is_speech && self.hangover_left_ms <= 0 {
            self.in_speech = false;
            return Some(VadEvent {
                kind: VadEventKind::SpeechEnd,
                probability: 1.0 - level.min(1.0),
            });
        }
        None
    }
}

#[async_trait]
impl VoiceActivityDetector for EnergyVad {
    async fn detect(
        &self,
        mut audio: broadcast::Receiver<AudioFrame>,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, VadEvent>> {
        let (tx, rx) = mpsc::channel::<VadEvent>(32);
        let mut gate = Gate::new(self.cfg.clone());

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = audio.recv() => received,
                };
                match frame {
                    Ok(frame) => {
                        if let Some(event) = gate.observe(&frame) {
                            debug!(target: "vad", kind = ?event.kind, "Speech boundary");
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "vad", skipped, "VAD lagged behind inbound audio");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(target: "vad", "VAD stopped");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tone(level: i16) -> AudioFrame {
        AudioFrame::from_samples(&[level; 480], 48_000, 1, Duration::ZERO)
    }

    fn gate() -> Gate {
        Gate::new(EnergyVadConfig {
            threshold: 0.05,
            min_start_ms: 30,
            hangover_ms: 20,
        })
    }

    #[test]
    fn speech_starts_after_min_voiced_time() {
        let mut g = gate();
        assert!(g.observe(&tone(8000)).is_none());
        assert!(g.observe(&tone(8000)).is_none());
        let event = g.observe(&tone(8000)).expect("start after 30ms");
        assert_eq!(event.kind, VadEventKind::SpeechStart);
    }

    #[test]
    fn short_bursts_do_not_trigger() {
        let mut g = gate();
        assert!(g.observe(&tone(8000)).is_none());
        assert!(g.observe(&tone(0)).is_none());
        assert!(g.observe(&tone(8000)).is_none());
        assert!(g.observe(&tone(0)).is_none());
    }

    #[test]
    fn speech_ends_after_hangover() {
        let mut g = gate();
        for _ in 0..3 {
            g.observe(&tone(8000));
        }
        assert!(g.observe(&tone(0)).is_none());
        let end = g.observe(&tone(0)).expect("end after 20ms of silence");
        assert_eq!(end.kind, VadEventKind::SpeechEnd);
        assert!(g.observe(&tone(0)).is_none());
    }

    #[tokio::test]
    async fn detect_streams_boundaries_until_audio_closes() {
        let vad = EnergyVad::new(EnergyVadConfig {
            threshold: 0.05,
            min_start_ms: 10,
            hangover_ms: 10,
        });
        let (tx, rx) = broadcast::channel(16);
        let events = vad.detect(rx, CancellationToken::new()).await.unwrap();

        tx.send(tone(8000)).unwrap();
        tx.send(tone(0)).unwrap();
        drop(tx);

        let kinds: Vec<_> = events.map(|e| e.kind).collect().await;
        assert_eq!(kinds, vec![VadEventKind::SpeechStart, VadEventKind::SpeechEnd]);
    }
}
