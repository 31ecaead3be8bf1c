use crate::error::{SwitchboardError, SwitchboardResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider family a channel speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Any OpenAI chat-completions compatible API.
    OpenAi,
    /// A local or remote Ollama server.
    Ollama,
    /// Google Gemini generative language API.
    Gemini,
}

impl Provider {
    /// Stable lowercase name, as stored in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
            Provider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SwitchboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            "gemini" => Ok(Provider::Gemini),
            other => Err(SwitchboardError::Config(format!(
                "Unknown provider '{other}'"
            ))),
        }
    }
}

/// A configured backend endpoint serving one or more models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique identifier.
    pub id: i64,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Provider family.
    pub provider: Provider,
    /// Base URL of the provider API.
    pub endpoint: String,
    /// Credential; may be empty for providers that do not need one.
    #[serde(default)]
    pub api_key: String,
    /// Maximum number of simultaneous in-flight requests.
    pub parallelism: u32,
    /// Higher priorities are tried first.
    #[serde(default)]
    pub priority: i32,
    /// Optional HTTP(S) proxy URL.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Channel {
    /// Checks that the channel carries what its provider needs before any
    /// network call is made.
    pub fn validate(&self) -> SwitchboardResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(SwitchboardError::Config(format!(
                "Channel {} has no endpoint configured",
                self.id
            )));
        }
        if self.provider != Provider::Ollama && self.api_key.trim().is_empty() {
            return Err(SwitchboardError::Config(format!(
                "Channel {} ({}) has no API key configured",
                self.id, self.provider
            )));
        }
        Ok(())
    }

    /// Endpoint without a trailing slash, ready for path joining.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// Association between a model name and a channel that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelBinding {
    /// Logical model name, e.g. `qwen3:32b`.
    pub model_name: String,
    /// Id of the serving channel.
    pub channel_id: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn channel(provider: Provider, key: &str) -> Channel {
        Channel {
            id: 7,
            name: "test".into(),
            provider,
            endpoint: "http://localhost:11434/".into(),
            api_key: key.into(),
            parallelism: 2,
            priority: 0,
            proxy: None,
            timeout_secs: 60,
        }
    }

    #[test]
    fn test_provider_roundtrip() {
        for p in [Provider::OpenAi, Provider::Ollama, Provider::Gemini] {
            assert_eq!(p.as_str().parse::<Provider>().unwrap(), p);
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.as_str()));
        }
        assert!("claude".parse::<Provider>().is_err());
    }

    #[test]
    fn test_validate_requires_key_except_ollama() {
        assert!(channel(Provider::Ollama, "").validate().is_ok());
        assert!(channel(Provider::OpenAi, "").validate().is_err());
        assert!(channel(Provider::Gemini, "k").validate().is_ok());
    }

    #[test]
    fn test_base_url_trims_slash() {
        assert_eq!(channel(Provider::Ollama, "").base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_timeout_default() {
        let c: Channel = serde_json::from_str(
            r#"{"id":1,"provider":"ollama","endpoint":"http://x","parallelism":1}"#,
        )
        .unwrap();
        assert_eq!(c.timeout_secs, 60);
        assert_eq!(c.priority, 0);
    }
}
