use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::backends::{ChatContext, TurnDetector};
use crate::{ParlanceError, Result};

/// Turn model that always predicts the same probability.
pub struct FixedTurnDetector {
    probability: f64,
    /// `None` means every language uses `default_threshold`.
    thresholds: Option<HashMap<String, f64>>,
    default_threshold: f64,
    fail: AtomicBool,
    predictions: AtomicUsize,
}

impl FixedTurnDetector {
    pub fn new(probability: f64, threshold: f64) -> Self {
        Self {
            probability,
            thresholds: None,
            default_threshold: threshold,
            fail: AtomicBool::new(false),
            predictions: AtomicUsize::new(0),
        }
    }

    /// Only the listed languages have a threshold; others are unsupported.
    pub fn with_languages<I, S>(mut self, thresholds: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        self.thresholds = Some(thresholds.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Makes every prediction fail.
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn predictions(&self) -> usize {
        self.predictions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TurnDetector for FixedTurnDetector {
    fn unlikely_threshold(&self, language: &str) -> Result<f64> {
        match &self.thresholds {
            None => Ok(self.default_threshold),
            Some(map) => map
                .get(language)
                .copied()
                .ok_or_else(|| ParlanceError::TurnDetection(format!("unsupported language: {language}"))),
        }
    }

    fn supports_language(&self, language: &str) -> bool {
        self.unlikely_threshold(language).is_ok()
    }

    async fn predict_end_of_turn(&self, _context: &ChatContext) -> Result<f64> {
        self.predictions.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ParlanceError::TurnDetection("model unavailable".into()));
        }
        Ok(self.probability)
    }
}
