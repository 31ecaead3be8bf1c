use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use switchboard_core::{SwitchboardError, SwitchboardResult};
use switchboard_tools::{ParamSpec, ParamType, Tool, ToolArgs, ToolContext, ToolDescriptor, ToolOutput};

/// Standard-alphabet base64 encoding and decoding of UTF-8 text.
pub struct Base64CodecTool {
    descriptor: ToolDescriptor,
}

impl Base64CodecTool {
    /// Create the tool.
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("base64_codec", "Encode text to base64 or decode base64 to text.")
                .param(ParamSpec::required("text", ParamType::String, "Input text"))
                .param(ParamSpec::required(
                    "operation",
                    ParamType::enumeration("Base64Operation", &["encode", "decode"]),
                    "encode or decode",
                )),
        }
    }
}

impl Default for Base64CodecTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode standard base64 into UTF-8 text.
pub fn decode(text: &str) -> SwitchboardResult<String> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| SwitchboardError::Tool(format!("Invalid base64 input: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| SwitchboardError::Tool("Decoded bytes are not valid UTF-8".into()))
}

#[async_trait]
impl Tool for Base64CodecTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &ToolContext) -> SwitchboardResult<ToolOutput> {
        let text = args.get_str("text")?;
        let output = match args.get_enum("operation")? {
            "decode" => decode(text)?,
            _ => STANDARD.encode(text),
        };
        Ok(ToolOutput::Text(output))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        assert_eq!(decode("aGVsbG8=").unwrap(), "hello");
        assert_eq!(decode("  aGVsbG8=\n").unwrap(), "hello");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("!!!"), Err(SwitchboardError::Tool(_))));
        // 0xff 0xfe is valid base64 but not UTF-8
        assert!(decode("//4=").is_err());
    }
}
