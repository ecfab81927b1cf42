use super::error::ToolResult;
use crate::backends::FunctionDefinition;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A capability the language model may invoke during a response.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key and the function name the model calls, e.g. "get_weather".
    fn name(&self) -> String;

    fn description(&self) -> String;

    /// JSON Schema of the argument object.
    fn parameters(&self) -> Value;

    /// Runs the tool on the model's raw JSON argument object.
    async fn call(&self, arguments: &str, cancel: CancellationToken) -> ToolResult<String>;

    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name(),
            description: self.description(),
            parameters: self.parameters(),
        }
    }
}
