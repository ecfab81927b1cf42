use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::ToolResult;
use super::traits::Tool;

type Handler = Arc<dyn Fn(String, CancellationToken) -> BoxFuture<'static, ToolResult<String>> + Send + Sync>;

/// A tool backed by an async closure.
///
/// ```rust,ignore
/// let weather = FunctionTool::new(
///     "get_weather",
///     "Current weather for a city",
///     json!({"type": "object", "properties": {"city": {"type": "string"}}}),
///     |args, _cancel| async move { Ok(format!("Sunny in {args}")) },
/// );
/// ```
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    handler: Handler,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(String, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args: String, cancel: CancellationToken| -> BoxFuture<'static, ToolResult<String>> {
                Box::pin(handler(args, cancel))
            }),
        }
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn call(&self, arguments: &str, cancel: CancellationToken) -> ToolResult<String> {
        (self.handler)(arguments.to_string(), cancel).await
    }
}
