//! Response generation with bounded tool calling.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backends::{ChatRequest, LanguageModel};
use crate::conversation::{ConversationHistory, Message};
use crate::tools::ToolRegistry;
use crate::{ParlanceError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub text: String,
    /// Tools invoked while producing this response.
    pub tool_calls: usize,
    /// Whether the final answer was forced by omitting tool definitions.
    pub forced: bool,
}

#[derive(Clone)]
pub struct ResponseGenerator {
    llm: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    history: ConversationHistory,
    max_tool_calls: usize,
}

impl ResponseGenerator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        tools: Arc<ToolRegistry>,
        history: ConversationHistory,
        max_tool_calls: usize,
    ) -> Self {
        Self {
            llm,
            tools,
            history,
            max_tool_calls,
        }
    }

    /// Produces the assistant's reply to `transcript`.
    ///
    /// At most `max_tool_calls` model calls may request a tool; after that one
    /// last call is made without tool definitions and its answer is used.
    /// Tool failures become `Error: ...` function results, never errors here.
    pub async fn generate(&self, transcript: &str, cancel: &CancellationToken) -> Result<Response> {
        let mut messages = vec![Message::user(transcript)];
        let functions = self.tools.definitions();
        let mut tool_calls = 0usize;

        for iteration in 0..self.max_tool_calls {
            let response = self
                .llm
                .chat(ChatRequest {
                    messages: messages.clone(),
                    functions: functions.clone(),
                })
                .await
                .map_err(|e| ParlanceError::context("LLM chat failed", e))?;

            let Some(call) = response.function_call.clone() else {
                let text = response.message.content.clone();
                self.history.append(Message::assistant(text.clone())).await;
                debug!(target: "response", iteration, tool_calls, "Plain response");
                return Ok(Response {
                    text,
                    tool_calls,
                    forced: false,
                });
            };

            let mut request_message = response.message;
            request_message.function_call = Some(call.clone());
            messages.push(request_message.clone());
            self.history.append(request_message).await;

            let content = match self.tools.execute(&call, cancel).await {
                Ok(result) => result,
                Err(e) => format!("Error: {e}"),
            };
            tool_calls += 1;

            let result_message = Message::function(call.name.clone(), content);
            messages.push(result_message.clone());
            self.history.append(result_message).await;
        }

        info!(target: "response", max_tool_calls = self.max_tool_calls, "Tool-call bound reached; forcing a plain answer");
        let response = self
            .llm
            .chat(ChatRequest {
                messages,
                functions: Vec::new(),
            })
            .await
            .map_err(|e| ParlanceError::context("LLM chat failed", e))?;
        let text = response.message.content;
        self.history.append(Message::assistant(text.clone())).await;
        Ok(Response {
            text,
            tool_calls,
            forced: true,
        })
    }
}
