use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::Message;
use crate::Result;

/// Tool description offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// A model-requested invocation; `arguments` is the raw serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Empty when the model must answer in plain text.
    pub functions: Vec<FunctionDefinition>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub function_call: Option<FunctionCall>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(content),
            function_call: None,
        }
    }

    pub fn call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        let call = FunctionCall {
            name: name.into(),
            arguments: arguments.into(),
        };
        let mut message = Message::assistant("");
        message.function_call = Some(call.clone());
        Self {
            message,
            function_call: Some(call),
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}
