//! End-of-turn detection after the user stops speaking.
//!
//! Once silence begins, the turn model is polled on a fixed tick. A turn ends
//! when the predicted probability reaches the language threshold or when the
//! silence outlasts the timeout, whichever happens first. Model failures only
//! ever fall back to the timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backends::{ChatContext, TurnDetector};
use crate::config::TurnSettings;
use crate::conversation::ConversationHistory;
use crate::metrics::AgentMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEndReason {
    Probability,
    Timeout,
}

impl fmt::Display for TurnEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TurnEndReason::Probability => "probability",
            TurnEndReason::Timeout => "timeout",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnDecision {
    pub reason: TurnEndReason,
    /// Last successful prediction, if any.
    pub probability: Option<f64>,
    pub silence: Duration,
}

/// Base language of a `lang-REGION` tag, or `None` when the tag has no
/// usable region split.
pub fn base_language(tag: &str) -> Option<&str> {
    let (base, region) = tag.split_once('-')?;
    if base.is_empty() || region.is_empty() || !base.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(base)
}

/// Exact tag, then base language, then `default`.
pub fn resolve_threshold(detector: &dyn TurnDetector, language: &str, default: f64) -> f64 {
    if let Ok(threshold) = detector.unlikely_threshold(language) {
        return threshold;
    }
    base_language(language)
        .and_then(|base| detector.unlikely_threshold(base).ok())
        .unwrap_or(default)
}

pub struct TurnDetectionLoop {
    detector: Arc<dyn TurnDetector>,
    history: ConversationHistory,
    language: String,
    settings: TurnSettings,
    metrics: Arc<AgentMetrics>,
}

impl TurnDetectionLoop {
    pub fn new(
        detector: Arc<dyn TurnDetector>,
        history: ConversationHistory,
        language: impl Into<String>,
        settings: TurnSettings,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        Self {
            detector,
            history,
            language: language.into(),
            settings,
            metrics,
        }
    }

    /// Polls until the turn ends; `None` when cancelled first.
    pub async fn run(self, cancel: CancellationToken) -> Option<TurnDecision> {
        let silence_start = Instant::now();
        let tick = self.settings.tick();
        let timeout = self.settings.timeout();
        let mut ticker = interval_at(silence_start + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_probability = None;

        if !self.detector.supports_language(&self.language) {
            debug!(target: "turn", language = %self.language, "Turn model does not list language");
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(target: "turn", "Turn detection cancelled");
                    return None;
                }
                _ = ticker.tick() => {}
            }

            let silence = silence_start.elapsed();
            if silence < self.settings.min_silence() {
                continue;
            }

            let context = ChatContext {
                messages: self.history.snapshot().await,
                language: self.language.clone(),
            };

            // Never let one inference run past the remaining silence budget.
            let budget = timeout.saturating_sub(silence).max(tick);
            let started = Instant::now();
            let prediction = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                res = tokio::time::timeout(budget, self.detector.predict_end_of_turn(&context)) => res,
            };
            let latency = started.elapsed();

            let probability = match prediction {
                Ok(Ok(p)) => {
                    self.metrics.record_turn_inference(latency, Some(p));
                    p
                }
                Ok(Err(e)) => {
                    self.metrics.record_turn_inference(latency, None);
                    warn!(target: "turn", error = %e, "Turn prediction failed");
                    if let Some(decision) = self.timed_out(silence_start, last_probability) {
                        return Some(decision);
                    }
                    continue;
                }
                Err(_) => {
                    self.metrics.record_turn_inference(latency, None);
                    warn!(target: "turn", budget_ms = budget.as_millis() as u64, "Turn prediction exceeded budget");
                    if let Some(decision) = self.timed_out(silence_start, last_probability) {
                        return Some(decision);
                    }
                    continue;
                }
            };
            last_probability = Some(probability);

            let threshold = resolve_threshold(
                self.detector.as_ref(),
                &self.language,
                self.settings.default_threshold,
            );
            let silence = silence_start.elapsed();
            debug!(target: "turn", probability, threshold, silence_ms = silence.as_millis() as u64, "Turn prediction");

            if silence >= timeout || probability >= threshold {
                let reason = if silence >= timeout {
                    TurnEndReason::Timeout
                } else {
                    TurnEndReason::Probability
                };
                return Some(self.finish(reason, last_probability, silence));
            }
        }
    }

    fn timed_out(&self, silence_start: Instant, probability: Option<f64>) -> Option<TurnDecision> {
        let silence = silence_start.elapsed();
        (silence >= self.settings.timeout())
            .then(|| self.finish(TurnEndReason::Timeout, probability, silence))
    }

    fn finish(&self, reason: TurnEndReason, probability: Option<f64>, silence: Duration) -> TurnDecision {
        self.metrics.record_end_of_utterance(silence);
        info!(
            target: "turn",
            reason = %reason,
            probability = ?probability,
            silence_ms = silence.as_millis() as u64,
            "End of turn"
        );
        TurnDecision {
            reason,
            probability,
            silence,
        }
    }
}
