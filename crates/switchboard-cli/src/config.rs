//! Host configuration file (`switchboard.toml`).

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use switchboard_agent::ServiceConfig;
use switchboard_core::{Channel, Provider};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub channels: Vec<ChannelSeed>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            service: ServiceConfig::default(),
            channels: Vec::new(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("./data/switchboard.db")
}

/// One `[[channels]]` row to write into the store.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSeed {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub provider: Provider,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key, used when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub parallelism: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    60
}

impl ChannelSeed {
    /// Build the stored channel, reading the key through `env` when needed.
    pub fn to_channel<F>(&self, env: F) -> anyhow::Result<Channel>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = match (&self.api_key, &self.api_key_env) {
            (Some(key), _) => key.clone(),
            (None, Some(var)) => env(var).with_context(|| {
                format!("channel {}: environment variable '{var}' is not set", self.id)
            })?,
            (None, None) => String::new(),
        };
        if self.parallelism == 0 {
            anyhow::bail!("channel {}: parallelism must be positive", self.id);
        }
        let channel = Channel {
            id: self.id,
            name: self.name.clone(),
            provider: self.provider,
            endpoint: self.endpoint.clone(),
            api_key,
            parallelism: self.parallelism,
            priority: self.priority,
            proxy: self.proxy.clone(),
            timeout_secs: self.timeout_secs,
        };
        channel.validate()?;
        Ok(channel)
    }
}

impl HostConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text)
                .with_context(|| format!("Failed to parse config file '{}'", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
database = "/tmp/sb.db"

[service]
max_tool_cycles = 3

[[channels]]
id = 1
name = "local"
provider = "ollama"
endpoint = "http://localhost:11434"
parallelism = 2
priority = 10
models = ["qwen3:32b", "gemma3:27b"]

[[channels]]
id = 2
provider = "openai"
endpoint = "https://api.openai.com/v1"
api_key_env = "OPENAI_KEY"
parallelism = 4
models = ["gpt-4o"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = HostConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/sb.db"));
        assert_eq!(config.service.max_tool_cycles, 3);
        assert_eq!(config.service.retry_delay_ms, 5000);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].models, vec!["qwen3:32b", "gemma3:27b"]);
        assert_eq!(config.channels[1].timeout_secs, 60);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = HostConfig::parse("").unwrap();
        assert_eq!(config.database, PathBuf::from("./data/switchboard.db"));
        assert_eq!(config.service, ServiceConfig::default());
        assert!(config.channels.is_empty());
    }

    #[test]
    fn test_api_key_from_env() {
        let config = HostConfig::parse(SAMPLE).unwrap();
        let channel = config.channels[1]
            .to_channel(|var| (var == "OPENAI_KEY").then(|| "sk-test".to_string()))
            .unwrap();
        assert_eq!(channel.api_key, "sk-test");
        assert_eq!(channel.provider, Provider::OpenAi);

        let err = config.channels[1].to_channel(|_| None).unwrap_err();
        assert!(err.to_string().contains("OPENAI_KEY"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = HostConfig::parse(SAMPLE).unwrap();
        let channel = config.channels[0].to_channel(|_| None).unwrap();
        assert!(channel.api_key.is_empty());
        assert_eq!(channel.priority, 10);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::load(&dir.path().join("absent.toml")).await.unwrap();
        assert!(config.channels.is_empty());
    }
}
