use crate::backends::AdapterSet;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{Channel, SwitchboardResult};
use switchboard_store::{
    capacity_total_key, inflight_key, total_parallelism, ChannelRegistry, CounterStore,
};
use tracing::{debug, error, warn};

/// Per-channel admission control on shared in-flight counters.
///
/// The check and the increment are two separate store operations, so
/// concurrent callers can briefly push a channel past its parallelism.
/// Nothing here fences against that.
pub struct AdmissionController {
    counters: Arc<dyn CounterStore>,
    registry: ChannelRegistry,
    adapters: AdapterSet,
    total_ttl: Duration,
}

impl AdmissionController {
    /// Controller over `counters`, probing health through `adapters`.
    pub fn new(
        counters: Arc<dyn CounterStore>,
        registry: ChannelRegistry,
        adapters: AdapterSet,
        total_ttl: Duration,
    ) -> Self {
        Self {
            counters,
            registry,
            adapters,
            total_ttl,
        }
    }

    /// Reserve one slot on `channel` if it has spare capacity.
    ///
    /// `None` means the channel is saturated and the caller should move on.
    pub async fn try_acquire(&self, channel: &Channel) -> SwitchboardResult<Option<CapacitySlot>> {
        let key = inflight_key(channel.id);
        let mut current = self.counters.get(&key).await?.unwrap_or(0);
        if current < 0 {
            warn!(channel = channel.id, current, "Negative in-flight count, resetting");
            self.counters.set(&key, 0).await?;
            current = 0;
        }
        if current >= i64::from(channel.parallelism) {
            debug!(channel = channel.id, current, parallelism = channel.parallelism, "Channel saturated");
            return Ok(None);
        }
        let now = self.counters.incr(&key).await?;
        debug!(channel = channel.id, inflight = now, "Slot acquired");
        Ok(Some(CapacitySlot {
            counters: self.counters.clone(),
            key,
            channel_id: channel.id,
            released: false,
        }))
    }

    /// Provider probe. Errors and panics inside the adapter count as unhealthy.
    pub async fn health_check(&self, channel: &Channel) -> bool {
        let adapter = match self.adapters.get(channel.provider) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(channel = channel.id, error = %e, "No adapter for channel");
                return false;
            }
        };
        match AssertUnwindSafe(adapter.is_healthy(channel))
            .catch_unwind()
            .await
        {
            Ok(healthy) => healthy,
            Err(_) => {
                error!(channel = channel.id, "Health probe panicked, treating channel as unhealthy");
                false
            }
        }
    }

    /// Spare slots across every channel serving `model`, never negative.
    ///
    /// The parallelism total is cached for a short TTL; in-flight counts are
    /// always read fresh.
    pub async fn available_capacity(&self, model: &str) -> SwitchboardResult<i64> {
        let channels = self.registry.list_channels(model).await?;
        if channels.is_empty() {
            return Ok(0);
        }

        let total_key = capacity_total_key(model);
        let total = match self.counters.get(&total_key).await? {
            Some(total) => total,
            None => {
                let total = total_parallelism(&channels);
                self.counters
                    .set_with_expiry(&total_key, total, self.total_ttl)
                    .await?;
                total
            }
        };

        let mut used = 0;
        for channel in &channels {
            used += self
                .counters
                .get(&inflight_key(channel.id))
                .await?
                .unwrap_or(0)
                .max(0);
        }
        Ok((total - used).max(0))
    }
}

/// One reserved unit of a channel's parallelism.
///
/// Call [`CapacitySlot::release`] when done. A slot dropped without release,
/// e.g. because its task was cancelled, is released from a spawned task.
pub struct CapacitySlot {
    counters: Arc<dyn CounterStore>,
    key: String,
    channel_id: i64,
    released: bool,
}

impl CapacitySlot {
    /// Id of the channel this slot belongs to.
    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }

    /// Give the slot back, decrementing the in-flight counter.
    pub async fn release(mut self) {
        self.released = true;
        match self.counters.decr(&self.key).await {
            Ok(n) => debug!(channel = self.channel_id, inflight = n, "Slot released"),
            Err(e) => error!(channel = self.channel_id, error = %e, "Failed to release slot"),
        }
    }
}

impl Drop for CapacitySlot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let counters = self.counters.clone();
        let key = std::mem::take(&mut self.key);
        let channel_id = self.channel_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = counters.decr(&key).await {
                        error!(channel = channel_id, error = %e, "Failed to release dropped slot");
                    }
                });
            }
            Err(_) => error!(channel = channel_id, "Slot dropped outside a runtime, not released"),
        }
    }
}
