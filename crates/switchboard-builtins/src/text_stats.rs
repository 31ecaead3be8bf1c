use async_trait::async_trait;
use serde::Serialize;
use switchboard_core::SwitchboardResult;
use switchboard_tools::{ParamSpec, ParamType, Tool, ToolArgs, ToolContext, ToolDescriptor, ToolOutput};

/// Counts of a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextStats {
    /// Unicode scalar values.
    pub characters: usize,
    /// Whitespace-separated words.
    pub words: usize,
    /// Lines, as split by [`str::lines`].
    pub lines: usize,
    /// Non-blank runs separated by `.`, `!` or `?`.
    pub sentences: usize,
}

impl TextStats {
    /// Count `text`.
    pub fn of(text: &str) -> Self {
        Self {
            characters: text.chars().count(),
            words: text.split_whitespace().count(),
            lines: text.lines().count(),
            sentences: text
                .split(['.', '!', '?'])
                .filter(|s| !s.trim().is_empty())
                .count(),
        }
    }
}

/// Counts characters, words, lines and sentences.
pub struct TextStatsTool {
    descriptor: ToolDescriptor,
}

impl TextStatsTool {
    /// Create the tool.
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "text_stats",
                "Count the characters, words, lines and sentences of a text.",
            )
            .param(ParamSpec::required("text", ParamType::String, "Text to analyze")),
        }
    }
}

impl Default for TextStatsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextStatsTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &ToolContext) -> SwitchboardResult<ToolOutput> {
        ToolOutput::json(&TextStats::of(args.get_str("text")?))
    }
}
