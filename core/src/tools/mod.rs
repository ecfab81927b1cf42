//! Callable tools offered to the language model.

pub mod error;
pub mod function;
pub mod registry;
pub mod traits;

pub use error::{ToolError, ToolResult};
pub use function::FunctionTool;
pub use registry::ToolRegistry;
pub use traits::Tool;
