use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchboard_core::{HistoryMessage, SwitchboardResult};

/// Read access to stored chat messages, plus the hook used to record them.
///
/// Both queries return messages oldest first.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Messages of `chat_id` sent at or after `since`.
    async fn messages_since(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
    ) -> SwitchboardResult<Vec<HistoryMessage>>;

    /// The newest `limit` messages of `chat_id`.
    async fn latest_messages(
        &self,
        chat_id: i64,
        limit: usize,
    ) -> SwitchboardResult<Vec<HistoryMessage>>;

    /// Store a message, replacing one with the same chat and message id.
    async fn record(&self, message: &HistoryMessage) -> SwitchboardResult<()>;
}
