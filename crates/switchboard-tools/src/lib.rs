//! Tool registry and invocation engine.
//!
//! Tools are registered once at startup with an explicit parameter schema.
//! The registry renders them for the system prompt, recognises tool calls in
//! model output, converts the string arguments to typed values and invokes
//! the tool by name.

/// String-to-typed argument conversion.
pub mod convert;
/// System prompt and tool list rendering.
pub mod prompt;
/// Tool registration and execution.
pub mod registry;
/// Tool definitions.
pub mod tool;

mod parse;
mod xml;

pub use convert::{bind_arguments, convert_value, ArgValue, ToolArgs};
pub use prompt::{format_system_prompt, strip_thinking};
pub use registry::ToolRegistry;
pub use tool::{FnTool, ParamSpec, ParamType, Tool, ToolContext, ToolDescriptor, ToolOutput};
