//! Built-in tools for the Switchboard router.
//!
//! # Main entry points
//!
//! - [`register_builtins()`] registers every tool below into a
//!   [`ToolRegistry`].

/// Base64 encoding and decoding.
pub mod base64_codec;
/// Current date and time.
pub mod current_time;
/// HTTP GET fetching with body truncation.
pub mod http_fetch;
/// Single-argument math functions.
pub mod math_function;
/// Character, word, line and sentence counts.
pub mod text_stats;

pub use base64_codec::Base64CodecTool;
pub use current_time::CurrentTimeTool;
pub use http_fetch::HttpFetchTool;
pub use math_function::MathFunctionTool;
pub use text_stats::{TextStats, TextStatsTool};

use std::sync::Arc;
use switchboard_tools::ToolRegistry;
use tracing::info;

/// Register all built-in tools into the given registry.
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(Arc::new(CurrentTimeTool::new()));
    registry.register(Arc::new(MathFunctionTool::new()));
    registry.register(Arc::new(TextStatsTool::new()));
    registry.register(Arc::new(Base64CodecTool::new()));
    registry.register(Arc::new(HttpFetchTool::new()));
    info!(tools = registry.tool_count(), "Built-in tools registered");
}
