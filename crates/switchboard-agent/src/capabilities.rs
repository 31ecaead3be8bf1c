use serde::{Deserialize, Serialize};
use switchboard_core::Provider;

/// What a model can do, as far as its name tells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Model identifier as listed by the channel.
    pub model: String,
    /// Understands tool definitions.
    pub tool_calling: bool,
    /// Accepts image input.
    pub vision: bool,
    /// Embedding-only model.
    pub embedding: bool,
    /// Streams its output.
    pub streaming: bool,
}

const EMBEDDING_MARKERS: &[&str] = &[
    "embed",
    "bge-",
    "all-minilm",
    "nomic-embed",
    "mxbai-embed",
    "sentence-transformer",
    "text-embedding",
];

const OLLAMA_VISION: &[&str] = &[
    "llava",
    "moondream",
    "llama3.2-vision",
    "qwen2-vl",
    "minicpm-v",
    "cogvlm",
    "gemma3",
];

const OLLAMA_TOOLS: &[&str] = &[
    "llama3.1",
    "llama3.2",
    "mistral-nemo",
    "firefunction",
    "command-r",
    "qwen2.5",
    "qwen3",
    "phi3",
];

const OPENAI_VISION: &[&str] = &["gpt-4o", "gpt-4-turbo", "gpt-4.1", "vision", "o1", "o3", "o4"];

/// Infer capabilities from a model identifier using static name tables.
pub fn infer_capabilities(provider: Provider, model: &str) -> ModelCapabilities {
    let lower = model.to_lowercase();
    let embedding = EMBEDDING_MARKERS.iter().any(|m| lower.contains(m));

    let (tool_calling, vision) = if embedding {
        (false, false)
    } else {
        match provider {
            Provider::Ollama => {
                let squashed = squash(&lower);
                (
                    OLLAMA_TOOLS.iter().any(|m| squashed.contains(&squash(m))),
                    OLLAMA_VISION.iter().any(|m| squashed.contains(&squash(m))),
                )
            }
            Provider::OpenAi => (
                lower.starts_with("gpt-") || is_o_series(&lower),
                OPENAI_VISION.iter().any(|m| lower.contains(m)),
            ),
            Provider::Gemini => {
                let bare = lower.trim_start_matches("models/");
                (
                    bare.starts_with("gemini"),
                    bare.starts_with("gemini-1.5")
                        || bare.starts_with("gemini-2")
                        || bare.contains("pro"),
                )
            }
        }
    };

    ModelCapabilities {
        model: model.to_string(),
        tool_calling,
        vision,
        embedding,
        streaming: true,
    }
}

/// Drops `.` and `-` so `qwen2.5` matches `qwen25` and `qwen-2.5`.
fn squash(s: &str) -> String {
    s.chars().filter(|c| *c != '.' && *c != '-').collect()
}

/// `o1`, `o3-mini`, `o4-mini-high` and so on.
fn is_o_series(lower: &str) -> bool {
    let mut chars = lower.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('o'), Some(d)) if d.is_ascii_digit()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_models_have_no_chat_features() {
        for name in ["bge-m3:latest", "nomic-embed-text", "text-embedding-3-small"] {
            let caps = infer_capabilities(Provider::Ollama, name);
            assert!(caps.embedding, "{name}");
            assert!(!caps.tool_calling && !caps.vision, "{name}");
            assert!(caps.streaming);
        }
    }

    #[test]
    fn test_ollama_tables_ignore_punctuation() {
        let caps = infer_capabilities(Provider::Ollama, "Qwen2.5:14b");
        assert!(caps.tool_calling);
        assert!(!caps.vision);

        let caps = infer_capabilities(Provider::Ollama, "gemma3:27b");
        assert!(caps.vision);
        assert!(!caps.tool_calling);

        let caps = infer_capabilities(Provider::Ollama, "llama3.2-vision:11b");
        assert!(caps.vision && caps.tool_calling);
    }

    #[test]
    fn test_openai_tables() {
        let caps = infer_capabilities(Provider::OpenAi, "gpt-4o-mini");
        assert!(caps.tool_calling && caps.vision);
        let caps = infer_capabilities(Provider::OpenAi, "o3-mini");
        assert!(caps.tool_calling && caps.vision);
        let caps = infer_capabilities(Provider::OpenAi, "gpt-3.5-turbo");
        assert!(caps.tool_calling && !caps.vision);
        let caps = infer_capabilities(Provider::OpenAi, "davinci-002");
        assert!(!caps.tool_calling);
    }

    #[test]
    fn test_gemini_tables() {
        let caps = infer_capabilities(Provider::Gemini, "gemini-2.0-flash");
        assert!(caps.tool_calling && caps.vision);
        let caps = infer_capabilities(Provider::Gemini, "gemini-1.0-pro");
        assert!(caps.vision);
        let caps = infer_capabilities(Provider::Gemini, "gemini-1.0-ultra");
        assert!(caps.tool_calling && !caps.vision);
    }
}
