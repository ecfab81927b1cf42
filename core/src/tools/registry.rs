use super::error::{ToolError, ToolResult};
use super::traits::Tool;
use crate::backends::{FunctionCall, FunctionDefinition};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tools available to the model, keyed by name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<dyn Tool>>>,
    call_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TOOL_TIMEOUT)
    }

    pub fn with_timeout(call_timeout: Duration) -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
            call_timeout,
        }
    }

    /// Register a new tool; names are unique.
    pub fn register(&self, tool: Arc<dyn Tool>) -> ToolResult<()> {
        let name = tool.name();
        match self.tools.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ToolError::Duplicate(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!(target: "tools", tool = %name, "Registering tool");
                slot.insert(tool);
                Ok(())
            }
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.clone())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions offered to the model, ordered by name.
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        let mut defs: Vec<FunctionDefinition> =
            self.tools.iter().map(|t| t.value().definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Executes a model-requested call.
    ///
    /// The payload must decode to a JSON object; the handler receives it
    /// verbatim. Handler runtime is bounded by the registry timeout and by `cancel`.
    #[tracing::instrument(skip(self, call, cancel), fields(tool.name = %call.name))]
    pub async fn execute(&self, call: &FunctionCall, cancel: &CancellationToken) -> ToolResult<String> {
        let start_time = Instant::now();

        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&call.arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        debug!(target: "tools", tool = %call.name, "Invoking tool");

        let fut = tool.call(&call.arguments, cancel.child_token());
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ToolError::Cancelled),
            res = timeout(self.call_timeout, fut) => match res {
                Ok(res) => res,
                Err(_) => {
                    warn!(target: "tools", tool = %call.name, "Tool execution timed out");
                    Err(ToolError::Timeout)
                }
            },
        };

        let latency_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => info!(target: "tools", tool = %call.name, latency_ms, "Tool invocation finished"),
            Err(e) => warn!(target: "tools", tool = %call.name, error = %e, latency_ms, "Tool execution failed"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use serde_json::json;

    fn echo() -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(
            "echo",
            "Echo the arguments",
            json!({"type": "object"}),
            |args, _cancel| async move { Ok(args) },
        ))
    }

    fn call(name: &str, arguments: &str) -> FunctionCall {
        FunctionCall {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = ToolRegistry::new();
        registry.register(echo()).unwrap();
        assert_eq!(
            registry.register(echo()),
            Err(ToolError::Duplicate("echo".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_by_name() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute(&call("missing", "{}"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown function: missing");
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected() {
        let registry = ToolRegistry::new();
        registry.register(echo()).unwrap();
        for bad in ["not json", "[1,2]", "\"city\""] {
            let err = registry
                .execute(&call("echo", bad), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)), "{bad}: {err:?}");
        }
    }

    #[tokio::test]
    async fn handler_receives_raw_payload() {
        let registry = ToolRegistry::new();
        registry.register(echo()).unwrap();
        let out = registry
            .execute(&call("echo", r#"{"city":"Paris"}"#), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, r#"{"city":"Paris"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let registry = ToolRegistry::with_timeout(Duration::from_millis(100));
        registry
            .register(Arc::new(FunctionTool::new(
                "slow",
                "never returns in time",
                json!({}),
                |_args, _cancel| async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok("late".to_string())
                },
            )))
            .unwrap();
        let err = registry
            .execute(&call("slow", "{}"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout);
    }

    #[test]
    fn definitions_are_sorted() {
        let registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(Arc::new(FunctionTool::new(name, "", json!({}), |a, _| async move { Ok(a) })))
                .unwrap();
        }
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
