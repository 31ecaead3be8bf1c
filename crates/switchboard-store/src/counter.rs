use async_trait::async_trait;
use std::time::Duration;
use switchboard_core::SwitchboardResult;

/// Key of the in-flight counter for one channel.
pub fn inflight_key(channel_id: i64) -> String {
    format!("channel:{channel_id}:inflight")
}

/// Key of the cached total parallelism for one model.
pub fn capacity_total_key(model: &str) -> String {
    format!("capacity:{model}:total")
}

/// String-keyed integer counters shared by every process using the store.
///
/// `incr` and `decr` are atomic and return the new value. Nothing else is
/// coordinated: a read followed by an increment may race with other callers.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value. Expired and missing keys read as `None`.
    async fn get(&self, key: &str) -> SwitchboardResult<Option<i64>>;
    /// Add one, treating a missing key as zero.
    async fn incr(&self, key: &str) -> SwitchboardResult<i64>;
    /// Subtract one, treating a missing key as zero.
    async fn decr(&self, key: &str) -> SwitchboardResult<i64>;
    /// Overwrite the value and clear any expiry.
    async fn set(&self, key: &str, value: i64) -> SwitchboardResult<()>;
    /// Overwrite the value; the key reads as absent once `ttl` has elapsed.
    async fn set_with_expiry(&self, key: &str, value: i64, ttl: Duration)
        -> SwitchboardResult<()>;
}
