//! Tunable agent settings.
//!
//! Defaults cover a 48 kHz mono deployment in "en-US". Values are overlaid
//! from an optional TOML file and then from `PARLANCE_*` environment variables.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ParlanceError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub language: String,
    pub voice: String,
    pub turn: TurnSettings,
    pub transcription: TranscriptionSettings,
    pub response: ResponseSettings,
    pub tasks: TaskSettings,
}

/// End-of-turn polling cadence and fallbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnSettings {
    pub tick_ms: u64,
    pub min_silence_ms: u64,
    pub timeout_ms: u64,
    pub default_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub sample_rate: u32,
    pub num_channels: u16,
    pub max_retry: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseSettings {
    /// Tool-invoking model calls allowed before a plain answer is forced.
    pub max_tool_calls: usize,
    pub tool_timeout_ms: u64,
}

/// Bounds on waiting for background tasks to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    pub feeder_stop_timeout_ms: u64,
    pub task_stop_timeout_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            voice: "default".to_string(),
            turn: TurnSettings::default(),
            transcription: TranscriptionSettings::default(),
            response: ResponseSettings::default(),
            tasks: TaskSettings::default(),
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            min_silence_ms: 50,
            timeout_ms: 2_000,
            default_threshold: 0.85,
        }
    }
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            num_channels: 1,
            max_retry: 3,
        }
    }
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            max_tool_calls: 10,
            tool_timeout_ms: 30_000,
        }
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            feeder_stop_timeout_ms: 100,
            task_stop_timeout_ms: 250,
        }
    }
}

impl TurnSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn min_silence(&self) -> Duration {
        Duration::from_millis(self.min_silence_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl TaskSettings {
    pub fn feeder_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.feeder_stop_timeout_ms)
    }

    pub fn task_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.task_stop_timeout_ms)
    }
}

impl AgentSettings {
    /// Load settings from a TOML file (path via PARLANCE_CONFIG or ./parlance.toml),
    /// then apply environment overrides. Unreadable or malformed files fall back to defaults.
    pub fn load() -> Self {
        let path = std::env::var("PARLANCE_CONFIG").unwrap_or_else(|_| "parlance.toml".into());
        let mut settings = match Self::from_file(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::info!(target: "config", path = %path, "No TOML config found; using defaults/env");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(target: "config", path = %path, error = %e, "Failed to load TOML; using defaults");
                Self::default()
            }
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    /// `Ok(None)` when the file does not exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map(Some)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<AgentSettings>(raw)?)
    }

    /// Overlays `PARLANCE_*` variables resolved through `lookup`; unparsable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(language) = non_empty("PARLANCE_LANGUAGE") {
            self.language = language;
        }
        if let Some(voice) = non_empty("PARLANCE_VOICE") {
            self.voice = voice;
        }
        if let Some(ms) = non_empty("PARLANCE_TURN_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.turn.timeout_ms = ms;
        }
        if let Some(ms) = non_empty("PARLANCE_FEEDER_STOP_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.tasks.feeder_stop_timeout_ms = ms;
        }
        if let Some(n) = non_empty("PARLANCE_MAX_TOOL_CALLS").and_then(|v| v.parse().ok()) {
            self.response.max_tool_calls = n;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(ParlanceError::Config("language must not be empty".into()));
        }
        if self.turn.tick_ms == 0 {
            return Err(ParlanceError::Config("turn.tick_ms must be positive".into()));
        }
        if self.turn.timeout_ms < self.turn.min_silence_ms {
            return Err(ParlanceError::Config(format!(
                "turn.timeout_ms ({}) is shorter than turn.min_silence_ms ({})",
                self.turn.timeout_ms, self.turn.min_silence_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.turn.default_threshold) {
            return Err(ParlanceError::Config(format!(
                "turn.default_threshold {} is outside [0, 1]",
                self.turn.default_threshold
            )));
        }
        Ok(())
    }
}
