use async_trait::async_trait;

use crate::conversation::Message;
use crate::Result;

/// Input to an end-of-turn prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatContext {
    pub messages: Vec<Message>,
    pub language: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TurnDetector: Send + Sync {
    /// Probability below which a turn end is considered unlikely for `language`.
    fn unlikely_threshold(&self, language: &str) -> Result<f64>;

    fn supports_language(&self, language: &str) -> bool;

    async fn predict_end_of_turn(&self, context: &ChatContext) -> Result<f64>;
}
