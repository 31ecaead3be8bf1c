use crate::convert::bind_arguments;
use crate::parse::parse_tool_calls;
use crate::tool::{Tool, ToolContext, ToolDescriptor, ToolOutput};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use switchboard_core::{SwitchboardError, SwitchboardResult, ToolInvocationRequest};
use tracing::{info, warn};

/// Central registry for all available tools.
///
/// Built once at startup, then shared read-only (typically behind an `Arc`).
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registers a tool. A second tool claiming an existing name is ignored
    /// with a warning; the first registration stays resolvable.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.descriptor().name.clone();
        if name.trim().is_empty() {
            warn!("Ignoring tool registered without a name");
            return false;
        }
        if self.tools.contains_key(&name) {
            warn!(tool = %name, "Duplicate tool name, registration skipped");
            return false;
        }
        info!(tool = %name, "Registered tool");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        true
    }

    /// Tool registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Whether a tool named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn list_descriptors(&self) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.descriptor())
            .collect()
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Renders every tool as the XML block embedded in the system prompt.
    pub fn render_prompt_xml(&self) -> String {
        let mut out = String::new();
        for desc in self.list_descriptors() {
            let _ = writeln!(out, "- <tool name=\"{}\">", desc.name);
            let _ = writeln!(out, "    <description>{}</description>", desc.description);
            let _ = writeln!(out, "    <parameters>");
            for p in &desc.params {
                let _ = writeln!(
                    out,
                    "        <parameter name=\"{}\" type=\"{}\" required=\"{}\">{}</parameter>",
                    p.name,
                    p.param_type.type_name(),
                    p.required,
                    p.display_description()
                );
            }
            let _ = writeln!(out, "    </parameters>");
            let _ = writeln!(out, "  </tool>");
        }
        out
    }

    /// Parses the first tool call out of a model turn. `None` means the turn
    /// is not a tool call, including when the markup is malformed or names an
    /// unregistered tool.
    pub fn try_parse_tool_call(&self, text: &str) -> Option<ToolInvocationRequest> {
        self.try_parse_tool_calls(text).into_iter().next()
    }

    /// Parses every tool call out of a model turn.
    pub fn try_parse_tool_calls(&self, text: &str) -> Vec<ToolInvocationRequest> {
        parse_tool_calls(text, |name| self.contains(name))
    }

    /// Converts the raw arguments and invokes the named tool.
    pub async fn execute(
        &self,
        request: &ToolInvocationRequest,
        ctx: &ToolContext,
    ) -> SwitchboardResult<ToolOutput> {
        let tool = self.tools.get(&request.name).ok_or_else(|| {
            SwitchboardError::Tool(format!("Tool '{}' not registered.", request.name))
        })?;
        let args = bind_arguments(tool.descriptor(), &request.arguments)?;
        tool.invoke(args, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
