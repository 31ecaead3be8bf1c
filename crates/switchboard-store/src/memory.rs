use crate::config::ConfigStore;
use crate::counter::CounterStore;
use crate::history::HistorySource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use switchboard_core::{Channel, HistoryMessage, SwitchboardError, SwitchboardResult};
use tokio::time::Instant;

struct Counter {
    value: i64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process store for tests and single-binary embedding.
///
/// Counters are only shared within this process.
#[derive(Default)]
pub struct MemoryStore {
    channels: Mutex<BTreeMap<i64, Channel>>,
    bindings: Mutex<HashMap<String, BTreeSet<i64>>>,
    settings: Mutex<HashMap<String, String>>,
    counters: Mutex<HashMap<String, Counter>>,
    messages: Mutex<Vec<HistoryMessage>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel and bind it to `models` in one step.
    pub fn with_channel(self, channel: Channel, models: &[&str]) -> Self {
        {
            let mut bindings = self.bindings.lock();
            for model in models {
                bindings
                    .entry((*model).to_string())
                    .or_default()
                    .insert(channel.id);
            }
        }
        self.channels.lock().insert(channel.id, channel);
        self
    }

    fn add(&self, key: &str, delta: i64) -> i64 {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let counter = counters.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at: None,
        });
        if !counter.is_live(now) {
            counter.value = 0;
            counter.expires_at = None;
        }
        counter.value += delta;
        counter.value
    }
}

fn sorted_chronologically(mut messages: Vec<HistoryMessage>) -> Vec<HistoryMessage> {
    messages.sort_by(|a, b| {
        a.sent_at
            .cmp(&b.sent_at)
            .then(a.message_id.cmp(&b.message_id))
    });
    messages
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn channels_for_model(&self, model: &str) -> SwitchboardResult<Vec<Channel>> {
        let ids = self.bindings.lock().get(model).cloned().unwrap_or_default();
        let channels = self.channels.lock();
        let mut found: Vec<Channel> = ids
            .iter()
            .filter_map(|id| channels.get(id).cloned())
            .collect();
        found.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn channel(&self, id: i64) -> SwitchboardResult<Option<Channel>> {
        Ok(self.channels.lock().get(&id).cloned())
    }

    async fn all_channels(&self) -> SwitchboardResult<Vec<Channel>> {
        Ok(self.channels.lock().values().cloned().collect())
    }

    async fn get_setting(&self, key: &str) -> SwitchboardResult<Option<String>> {
        Ok(self.settings.lock().get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> SwitchboardResult<()> {
        self.settings
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn upsert_channel(&self, channel: &Channel) -> SwitchboardResult<()> {
        self.channels.lock().insert(channel.id, channel.clone());
        Ok(())
    }

    async fn bind_model(&self, model: &str, channel_id: i64) -> SwitchboardResult<()> {
        if !self.channels.lock().contains_key(&channel_id) {
            return Err(SwitchboardError::Store(format!(
                "Cannot bind '{model}' to unknown channel {channel_id}"
            )));
        }
        self.bindings
            .lock()
            .entry(model.to_string())
            .or_default()
            .insert(channel_id);
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> SwitchboardResult<Option<i64>> {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        match counters.get(key) {
            Some(c) if c.is_live(now) => Ok(Some(c.value)),
            Some(_) => {
                counters.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn incr(&self, key: &str) -> SwitchboardResult<i64> {
        Ok(self.add(key, 1))
    }

    async fn decr(&self, key: &str) -> SwitchboardResult<i64> {
        Ok(self.add(key, -1))
    }

    async fn set(&self, key: &str, value: i64) -> SwitchboardResult<()> {
        self.counters.lock().insert(
            key.to_string(),
            Counter {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> SwitchboardResult<()> {
        self.counters.lock().insert(
            key.to_string(),
            Counter {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl HistorySource for MemoryStore {
    async fn messages_since(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
    ) -> SwitchboardResult<Vec<HistoryMessage>> {
        let found = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.chat_id == chat_id && m.sent_at >= since)
            .cloned()
            .collect();
        Ok(sorted_chronologically(found))
    }

    async fn latest_messages(
        &self,
        chat_id: i64,
        limit: usize,
    ) -> SwitchboardResult<Vec<HistoryMessage>> {
        let all = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        let mut all = sorted_chronologically(all);
        let skip = all.len().saturating_sub(limit);
        Ok(all.split_off(skip))
    }

    async fn record(&self, message: &HistoryMessage) -> SwitchboardResult<()> {
        let mut messages = self.messages.lock();
        messages.retain(|m| !(m.chat_id == message.chat_id && m.message_id == message.message_id));
        messages.push(message.clone());
        Ok(())
    }
}
