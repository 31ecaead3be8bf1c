use crate::config::ConfigStore;
use std::sync::Arc;
use switchboard_core::{Channel, SwitchboardResult};
use tracing::debug;

/// Read-only view of which channels serve a model.
#[derive(Clone)]
pub struct ChannelRegistry {
    store: Arc<dyn ConfigStore>,
}

impl ChannelRegistry {
    /// Registry over the channels and bindings held in `store`.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Channels bound to `model`, highest priority first, ties by ascending id.
    ///
    /// An empty list means the model is not configured; callers must not
    /// keep retrying it.
    pub async fn list_channels(&self, model: &str) -> SwitchboardResult<Vec<Channel>> {
        let mut channels = self.store.channels_for_model(model).await?;
        channels.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        if channels.is_empty() {
            debug!(model, "No channel bound to model");
        }
        Ok(channels)
    }

    /// Channel by id, `None` when it does not exist.
    pub async fn channel(&self, id: i64) -> SwitchboardResult<Option<Channel>> {
        self.store.channel(id).await
    }
}

/// Sum of the declared parallelism of `channels`.
pub fn total_parallelism(channels: &[Channel]) -> i64 {
    channels.iter().map(|c| i64::from(c.parallelism)).sum()
}
