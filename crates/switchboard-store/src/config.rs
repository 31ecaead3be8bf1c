use async_trait::async_trait;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use switchboard_core::{Channel, SwitchboardResult};
use tracing::{info, warn};

/// Setting key: retry rounds for conversational requests.
pub const MAX_RETRY_COUNT: &str = "LLM:MaxRetryCount";
/// Setting key: retry rounds for image analysis and embeddings.
pub const MAX_IMAGE_RETRY_COUNT: &str = "LLM:MaxImageRetryCount";
/// Setting key: model used to describe images.
pub const ALT_PHOTO_MODEL_NAME: &str = "LLM:AltPhotoModelName";
/// Setting key: model used for embeddings.
pub const EMBEDDING_MODEL_NAME: &str = "LLM:EmbeddingModelName";

const DEFAULT_MAX_RETRY_COUNT: u32 = 100;
const DEFAULT_MAX_IMAGE_RETRY_COUNT: u32 = 1000;
const DEFAULT_ALT_PHOTO_MODEL: &str = "gemma3:27b";
const DEFAULT_EMBEDDING_MODEL: &str = "bge-m3:latest";

/// Channel rows, model bindings and key/value settings.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Channels bound to `model`. Unknown models yield an empty list.
    async fn channels_for_model(&self, model: &str) -> SwitchboardResult<Vec<Channel>>;
    /// A single channel by id.
    async fn channel(&self, id: i64) -> SwitchboardResult<Option<Channel>>;
    /// Every configured channel, ordered by id.
    async fn all_channels(&self) -> SwitchboardResult<Vec<Channel>>;
    /// Raw setting value, if present.
    async fn get_setting(&self, key: &str) -> SwitchboardResult<Option<String>>;
    /// Insert or overwrite a setting.
    async fn set_setting(&self, key: &str, value: &str) -> SwitchboardResult<()>;
    /// Insert or replace a channel row, keyed by its id.
    async fn upsert_channel(&self, channel: &Channel) -> SwitchboardResult<()>;
    /// Associate a model name with a channel. Idempotent.
    async fn bind_model(&self, model: &str, channel_id: i64) -> SwitchboardResult<()>;
}

/// Typed access to the service settings.
///
/// A key read while absent is written back with its default, so operators
/// find every tunable in the store after the first request.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn ConfigStore>,
}

impl Settings {
    /// Settings read from and defaulted into `store`.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Retry rounds for conversational requests.
    pub async fn max_retry_count(&self) -> SwitchboardResult<u32> {
        self.parsed(MAX_RETRY_COUNT, DEFAULT_MAX_RETRY_COUNT).await
    }

    /// Retry rounds for image analysis and embeddings.
    pub async fn max_image_retry_count(&self) -> SwitchboardResult<u32> {
        self.parsed(MAX_IMAGE_RETRY_COUNT, DEFAULT_MAX_IMAGE_RETRY_COUNT)
            .await
    }

    /// Model used for image analysis.
    pub async fn alt_photo_model(&self) -> SwitchboardResult<String> {
        self.get_or_init(ALT_PHOTO_MODEL_NAME, DEFAULT_ALT_PHOTO_MODEL)
            .await
    }

    /// Model used for embeddings.
    pub async fn embedding_model(&self) -> SwitchboardResult<String> {
        self.get_or_init(EMBEDDING_MODEL_NAME, DEFAULT_EMBEDDING_MODEL)
            .await
    }

    async fn get_or_init(&self, key: &str, default: &str) -> SwitchboardResult<String> {
        if let Some(value) = self.store.get_setting(key).await? {
            return Ok(value);
        }
        info!(key, default, "Setting absent, persisting default");
        self.store.set_setting(key, default).await?;
        Ok(default.to_string())
    }

    async fn parsed<T>(&self, key: &str, default: T) -> SwitchboardResult<T>
    where
        T: FromStr + Display,
    {
        let raw = self.get_or_init(key, &default.to_string()).await?;
        match raw.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(key, value = %raw, default = %default, "Unparseable setting, using default");
                Ok(default)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_defaults_are_persisted_on_first_read() {
        let store = Arc::new(MemoryStore::new());
        let settings = Settings::new(store.clone());

        assert_eq!(store.get_setting(MAX_RETRY_COUNT).await.unwrap(), None);
        assert_eq!(settings.max_retry_count().await.unwrap(), 100);
        assert_eq!(
            store.get_setting(MAX_RETRY_COUNT).await.unwrap().as_deref(),
            Some("100")
        );
        assert_eq!(settings.max_image_retry_count().await.unwrap(), 1000);
        assert_eq!(settings.alt_photo_model().await.unwrap(), "gemma3:27b");
        assert_eq!(settings.embedding_model().await.unwrap(), "bge-m3:latest");
    }

    #[tokio::test]
    async fn test_stored_values_win() {
        let store = Arc::new(MemoryStore::new());
        store.set_setting(MAX_RETRY_COUNT, " 3 ").await.unwrap();
        store
            .set_setting(EMBEDDING_MODEL_NAME, "nomic-embed-text")
            .await
            .unwrap();
        let settings = Settings::new(store);
        assert_eq!(settings.max_retry_count().await.unwrap(), 3);
        assert_eq!(settings.embedding_model().await.unwrap(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_unparseable_value_falls_back_without_rewrite() {
        let store = Arc::new(MemoryStore::new());
        store.set_setting(MAX_RETRY_COUNT, "lots").await.unwrap();
        let settings = Settings::new(store.clone());
        assert_eq!(settings.max_retry_count().await.unwrap(), 100);
        assert_eq!(
            store.get_setting(MAX_RETRY_COUNT).await.unwrap().as_deref(),
            Some("lots")
        );
    }
}
