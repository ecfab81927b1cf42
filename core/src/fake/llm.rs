use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backends::{ChatRequest, ChatResponse, LanguageModel};
use crate::{ParlanceError, Result};

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum LlmStep {
    Reply(String),
    Call { name: String, arguments: String },
    Fail(String),
}

impl LlmStep {
    fn respond(&self) -> Result<ChatResponse> {
        match self {
            LlmStep::Reply(text) => Ok(ChatResponse::text(text.clone())),
            LlmStep::Call { name, arguments } => Ok(ChatResponse::call(name.clone(), arguments.clone())),
            LlmStep::Fail(message) => Err(ParlanceError::Llm(message.clone())),
        }
    }
}

/// Language model that plays back queued steps, then repeats a fallback step.
///
/// Requests carrying no tool definitions are always answered with the
/// fallback reply text, mirroring a model forced to answer in prose.
pub struct ScriptedLlm {
    steps: Mutex<VecDeque<LlmStep>>,
    fallback: LlmStep,
    forced_reply: String,
    delay: Duration,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    /// Always answers `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: LlmStep::Reply(text.clone()),
            forced_reply: text,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests `name` on every call that offers tools; `forced_reply` otherwise.
    pub fn always_calling(
        name: impl Into<String>,
        arguments: impl Into<String>,
        forced_reply: impl Into<String>,
    ) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: LlmStep::Call {
                name: name.into(),
                arguments: arguments.into(),
            },
            forced_reply: forced_reply.into(),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fallback: LlmStep::Fail(message.into()),
            ..Self::replying("")
        }
    }

    /// Queues steps played before the fallback.
    pub fn then(self, step: LlmStep) -> Self {
        self.steps.lock().push_back(step);
        self
    }

    pub fn then_call(self, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        self.then(LlmStep::Call {
            name: name.into(),
            arguments: arguments.into(),
        })
    }

    /// Delay before each answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let offers_tools = !request.functions.is_empty();
        self.requests.lock().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let step = self.steps.lock().pop_front();
        match step {
            Some(step) => step.respond(),
            None if !offers_tools && !matches!(self.fallback, LlmStep::Fail(_)) => {
                Ok(ChatResponse::text(self.forced_reply.clone()))
            }
            None => self.fallback.respond(),
        }
    }
}
