//! Per-session timing and transition metrics.
//!
//! One [`AgentMetrics`] is owned by each agent instance; callers read it
//! through [`AgentMetrics::snapshot`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::agent::AgentState;

#[derive(Debug, Default)]
struct Timings {
    session_start: Option<Instant>,
    first_word_recorded: bool,
    first_word_latency: Option<Duration>,
    session_duration: Option<Duration>,
    end_of_utterance_delay: Option<Duration>,
    turn_inference_latency: Option<Duration>,
    eou_probability: Option<f64>,
}

#[derive(Debug, Default)]
pub struct AgentMetrics {
    timings: Mutex<Timings>,
    transitions: DashMap<String, u64>,
}

/// Read-only copy of the session metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub first_word_latency_ms: Option<f64>,
    pub session_duration_ms: Option<f64>,
    pub end_of_utterance_delay_ms: Option<f64>,
    pub turn_inference_latency_ms: Option<f64>,
    pub eou_probability: Option<f64>,
    /// Keyed by `"{from}→{to}"`.
    pub state_transitions: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn transitions(&self, from: AgentState, to: AgentState) -> u64 {
        self.state_transitions
            .get(&transition_key(from, to))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_transitions(&self) -> u64 {
        self.state_transitions.values().sum()
    }
}

pub fn transition_key(from: AgentState, to: AgentState) -> String {
    format!("{from}→{to}")
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_session_start(&self) {
        self.timings.lock().session_start = Some(Instant::now());
    }

    /// Records time since session start as first-word latency.
    ///
    /// Returns the recorded latency on the first call of the session and
    /// `None` afterwards.
    pub fn record_first_word(&self) -> Option<Duration> {
        let mut t = self.timings.lock();
        if t.first_word_recorded {
            return None;
        }
        t.first_word_recorded = true;
        let latency = t.session_start.map(|start| start.elapsed()).unwrap_or_default();
        t.first_word_latency = Some(latency);
        Some(latency)
    }

    pub fn record_session_end(&self) {
        let mut t = self.timings.lock();
        if let Some(start) = t.session_start {
            t.session_duration = Some(start.elapsed());
        }
    }

    pub fn record_transition(&self, from: AgentState, to: AgentState) {
        *self.transitions.entry(transition_key(from, to)).or_insert(0) += 1;
    }

    /// Latency of one end-of-turn inference; the probability only when the model answered.
    pub fn record_turn_inference(&self, latency: Duration, probability: Option<f64>) {
        let mut t = self.timings.lock();
        t.turn_inference_latency = Some(latency);
        if probability.is_some() {
            t.eou_probability = probability;
        }
    }

    pub fn record_end_of_utterance(&self, delay: Duration) {
        self.timings.lock().end_of_utterance_delay = Some(delay);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let t = self.timings.lock();
        MetricsSnapshot {
            first_word_latency_ms: t.first_word_latency.map(millis),
            session_duration_ms: t.session_duration.map(millis),
            end_of_utterance_delay_ms: t.end_of_utterance_delay.map(millis),
            turn_inference_latency_ms: t.turn_inference_latency.map(millis),
            eou_probability: t.eou_probability,
            state_transitions: self
                .transitions
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}
