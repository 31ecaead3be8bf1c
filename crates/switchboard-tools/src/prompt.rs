use chrono::{DateTime, TimeZone};
use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").ok());

/// Removes `<think>…</think>` blocks and surrounding whitespace.
pub fn strip_thinking(raw: &str) -> String {
    match THINK_BLOCK.as_ref() {
        Some(re) => re.replace_all(raw, "").trim().to_string(),
        None => raw.trim().to_string(),
    }
}

const NO_TOOLS: &str = "<!-- No tools are currently available for you to use. -->";

/// Builds the system prompt that seeds every agent loop.
pub fn format_system_prompt<Tz>(
    bot_name: &str,
    chat_id: i64,
    now: &DateTime<Tz>,
    tools_xml: &str,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let bot_name = if bot_name.trim().is_empty() {
        "AI Assistant"
    } else {
        bot_name
    };
    let tools_xml = if tools_xml.trim().is_empty() {
        NO_TOOLS
    } else {
        tools_xml.trim_end()
    };
    let now = now.format("%Y-%m-%d %H:%M:%S %:z");

    format!(
        "Your name is {bot_name} and you are an AI assistant. The current time is {now}. \
The id of the current chat is {chat_id}.\n\n\
You are taking part in a group chat. History lines have the form \
[time] Sender (optional reply target): content. Read the context carefully.\n\n\
Your job is to help the users. You may call external tools to do so. \
These are the tools you can use right now:\n\n\
{tools_xml}\n\n\
If you decide to use one of the tools above, your reply must follow one of these XML \
formats exactly and contain nothing else, with no explanation or chat before or after the XML:\n\
<tool_name>\n\
  <parameter1_name>value1</parameter1_name>\n\
  <parameter2_name>value2</parameter2_name>\n\
  ...\n\
</tool_name>\n\
or\n\
<tool name=\"tool_name\">\n\
  <parameters>\n\
    <parameter1_name>value1</parameter1_name>\n\
  </parameters>\n\
</tool>\n\
(Replace 'tool_name' and the parameters with the real tool name and values. Make sure the XML is well-formed.)\n\n\
If a tool call (especially a search) did not return what you needed, you may:\n\
1. Change the arguments (broader or narrower keywords, other options) and call the same tool again.\n\
2. Try another available tool if repeated attempts do not help or another tool fits better.\n\
3. Keep track of what you tried and adjust your approach while thinking.\n\
Once you have enough information, or need no tools at all, move on.\n\n\
When you use information obtained from a tool and the result carries a source or URL, cite it \
in your answer, for example as a Markdown link [title](URL) or as a list of sources at the end.\n\n\
Decide carefully whether the request needs a tool. When it does not, or once the tools are done, \
answer the user directly in natural language. Do not imitate the history line format in your answer."
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_strip_thinking() {
        assert_eq!(strip_thinking("<think>plan</think>answer"), "answer");
        assert_eq!(
            strip_thinking("<THINK>\nmulti\nline\n</Think>\n  <weather/>  "),
            "<weather/>"
        );
        assert_eq!(strip_thinking("<think>only</think>"), "");
        assert_eq!(strip_thinking("a <think>x</think> b"), "a  b");
    }

    #[test]
    fn test_system_prompt_contents() {
        let now = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 5, 6, 7, 8, 9)
            .unwrap();
        let prompt = format_system_prompt("", -1001, &now, "- <tool name=\"x\">");
        assert!(prompt.starts_with("Your name is AI Assistant"));
        assert!(prompt.contains("2025-05-06 07:08:09 +08:00"));
        assert!(prompt.contains("-1001"));
        assert!(prompt.contains("- <tool name=\"x\">"));
        assert!(prompt.contains("<tool name=\"tool_name\">"));
    }

    #[test]
    fn test_system_prompt_without_tools() {
        let now = chrono::Utc::now();
        let prompt = format_system_prompt("Bot", 1, &now, "  ");
        assert!(prompt.contains(NO_TOOLS));
    }
}
