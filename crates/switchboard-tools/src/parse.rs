use crate::xml::{self, Element};
use std::collections::HashMap;
use switchboard_core::ToolInvocationRequest;
use tracing::{debug, warn};

/// Removes an optional markdown code fence around the whole text.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```xml") {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    s.trim()
}

/// Extracts every tool call encoded in `text`.
///
/// The trimmed, fence-stripped text must consist entirely of XML elements.
/// Each root is matched against the accepted forms and roots naming no
/// registered tool are skipped. Malformed markup yields no calls.
pub(crate) fn parse_tool_calls(
    text: &str,
    is_registered: impl Fn(&str) -> bool,
) -> Vec<ToolInvocationRequest> {
    let body = strip_code_fence(text);
    if !body.starts_with('<') || !body.ends_with('>') {
        return Vec::new();
    }

    let roots = match xml::parse_fragment(body) {
        Ok(roots) => roots,
        Err(e) => {
            debug!(error = %e, "Model output is not well-formed tool markup");
            return Vec::new();
        }
    };

    let mut calls = Vec::new();
    for root in &roots {
        match match_call(root, &is_registered) {
            Some((name, container)) => calls.push(ToolInvocationRequest {
                name,
                arguments: container.map(collect_arguments).unwrap_or_default(),
            }),
            None => debug!(element = %root.name, "Skipped unrecognized root element"),
        }
    }
    calls
}

/// Resolves the tool name and the element holding its arguments.
fn match_call<'e>(
    root: &'e Element,
    is_registered: &impl Fn(&str) -> bool,
) -> Option<(String, Option<&'e Element>)> {
    // <tool name="X"><parameters>..</parameters></tool>, or direct <parameter> children
    if root.name == "tool" {
        if let Some(name) = root.attr("name") {
            if !is_registered(name) {
                return None;
            }
            let container = root.element("parameters").or_else(|| {
                if root.elements().any(|e| e.name == "parameter") {
                    Some(root)
                } else {
                    warn!(tool = %name, "Tool call has neither <parameters> nor <parameter> elements");
                    None
                }
            });
            return Some((name.to_string(), container));
        }
    }

    // <X><arg>v</arg></X>
    if is_registered(&root.name) {
        return Some((root.name.clone(), Some(root)));
    }

    // <tool_name><X>..</X></tool_name>
    if root.name == "tool_name" {
        let mut children = root.elements();
        if let (Some(inner), None) = (children.next(), children.next()) {
            if is_registered(&inner.name) {
                return Some((inner.name.clone(), Some(inner)));
            }
        }
    }

    None
}

fn collect_arguments(container: &Element) -> HashMap<String, String> {
    let mut args = HashMap::new();
    for element in container.elements() {
        match (element.name.as_str(), element.attr("name")) {
            ("parameter", Some(key)) => {
                if !key.is_empty() {
                    args.insert(key.to_string(), element.text());
                }
            }
            _ => {
                args.insert(element.name.clone(), element.text());
            }
        }
    }
    args
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn registered(name: &str) -> bool {
        matches!(name, "weather" | "search")
    }

    #[test]
    fn test_code_fence_stripping() {
        assert_eq!(strip_code_fence("```xml\n<a/>\n```"), "<a/>");
        assert_eq!(strip_code_fence("  ```<a/>```  "), "<a/>");
        assert_eq!(strip_code_fence("<a/>"), "<a/>");
    }

    #[test]
    fn test_tool_with_direct_parameters() {
        let calls = parse_tool_calls(
            r#"<tool name="search"><parameter name="query">rust</parameter><parameter name="">x</parameter></tool>"#,
            registered,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments.len(), 1);
        assert_eq!(calls[0].arguments["query"], "rust");
    }

    #[test]
    fn test_tool_without_parameters_still_counts() {
        let calls = parse_tool_calls(r#"<tool name="weather"></tool>"#, registered);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.is_empty());
    }

    #[test]
    fn test_tool_name_wrapper() {
        let calls = parse_tool_calls(
            "<tool_name><weather><city>Oslo</city></weather></tool_name>",
            registered,
        );
        assert_eq!(calls[0].name, "weather");
        assert_eq!(calls[0].arguments["city"], "Oslo");
    }

    #[test]
    fn test_multiple_roots_keep_order_and_skip_unknown() {
        let calls = parse_tool_calls(
            "<weather><city>A</city></weather>\n<unknown/>\n<search><query>B</query></search>",
            registered,
        );
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["weather", "search"]);
    }

    #[test]
    fn test_prose_is_not_a_call() {
        assert!(parse_tool_calls("The weather is <b>nice</b>", registered).is_empty());
        assert!(parse_tool_calls("<weather><city>Tokyo</weather>", registered).is_empty());
    }

    #[test]
    fn test_unregistered_tool_attribute() {
        assert!(parse_tool_calls(r#"<tool name="rm_rf"><parameters/></tool>"#, registered).is_empty());
    }
}
