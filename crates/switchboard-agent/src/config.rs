use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of [`crate::LlmService`]. Read from the `[service]` table of the
/// host config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name the assistant goes by in the system prompt.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// Backend calls allowed per request.
    #[serde(default = "default_max_tool_cycles")]
    pub max_tool_cycles: u32,
    /// Delay between two scheduler rounds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// TTL of the cached per-model parallelism total.
    #[serde(default = "default_capacity_cache_ttl_secs")]
    pub capacity_cache_ttl_secs: u64,
    /// How far back chat history is read.
    #[serde(default = "default_history_window_minutes")]
    pub history_window_minutes: i64,
    /// History read regardless of the window.
    #[serde(default = "default_history_min_messages")]
    pub history_min_messages: usize,
}

fn default_bot_name() -> String {
    "Switchboard".to_string()
}

fn default_max_tool_cycles() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_capacity_cache_ttl_secs() -> u64 {
    15
}

fn default_history_window_minutes() -> i64 {
    60
}

fn default_history_min_messages() -> usize {
    10
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bot_name: default_bot_name(),
            max_tool_cycles: default_max_tool_cycles(),
            retry_delay_ms: default_retry_delay_ms(),
            capacity_cache_ttl_secs: default_capacity_cache_ttl_secs(),
            history_window_minutes: default_history_window_minutes(),
            history_min_messages: default_history_min_messages(),
        }
    }
}

impl ServiceConfig {
    /// [`Self::retry_delay_ms`] as a `Duration`.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// [`Self::capacity_cache_ttl_secs`] as a `Duration`.
    pub fn capacity_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.capacity_cache_ttl_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.bot_name, "Switchboard");
        assert_eq!(config.max_tool_cycles, 5);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.capacity_cache_ttl(), Duration::from_secs(15));
    }

    #[test]
    fn test_partial_override() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"max_tool_cycles": 2, "retry_delay_ms": 0}"#).unwrap();
        assert_eq!(config.max_tool_cycles, 2);
        assert_eq!(config.retry_delay(), Duration::ZERO);
        assert_eq!(config.history_min_messages, 10);
    }
}
