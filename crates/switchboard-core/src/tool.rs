use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tool call parsed from model output: the tool name plus raw string
/// arguments keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Name of the tool to invoke.
    pub name: String,
    /// Raw, not yet converted argument values.
    pub arguments: HashMap<String, String>,
}

impl ToolInvocationRequest {
    /// Creates a request with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: HashMap::new(),
        }
    }

    /// Adds an argument, replacing any earlier value under the same name.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_arg_overwrites() {
        let req = ToolInvocationRequest::new("weather")
            .with_arg("city", "Paris")
            .with_arg("city", "Tokyo");
        assert_eq!(req.arguments.len(), 1);
        assert_eq!(req.arguments["city"], "Tokyo");
    }
}
