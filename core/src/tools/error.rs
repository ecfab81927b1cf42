use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown function: {0}")]
    NotFound(String),

    #[error("invalid function arguments JSON: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("tool timed out")]
    Timeout,

    #[error("tool call cancelled")]
    Cancelled,

    #[error("duplicate tool name: {0}")]
    Duplicate(String),
}

pub type ToolResult<T> = Result<T, ToolError>;
