use crate::admission::AdmissionController;
use crate::backends::AdapterSet;
use crate::capabilities::ModelCapabilities;
use crate::config::ServiceConfig;
use crate::context::HistoryWindow;
use crate::runner::{AgentLoop, LoopOutcome};
use crate::scheduler::RetryScheduler;
use chrono::Local;
use futures_util::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use switchboard_core::{
    Attachment, Channel, ConversationTurn, HistoryMessage, SwitchboardError, SwitchboardResult,
    Transcript,
};
use switchboard_store::{ChannelRegistry, ConfigStore, CounterStore, HistorySource, Settings};
use switchboard_tools::{format_system_prompt, ToolContext, ToolRegistry};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, warn};

/// The three store seams the service reads from.
#[derive(Clone)]
pub struct Stores {
    /// Channels, bindings and settings.
    pub config: Arc<dyn ConfigStore>,
    /// Shared in-flight counters.
    pub counters: Arc<dyn CounterStore>,
    /// Chat history.
    pub history: Arc<dyn HistorySource>,
}

impl Stores {
    /// All three seams served by one store, e.g. a `SqliteStore`.
    pub fn shared<T>(store: Arc<T>) -> Self
    where
        T: ConfigStore + CounterStore + HistorySource + 'static,
    {
        Self {
            config: store.clone(),
            counters: store.clone(),
            history: store,
        }
    }
}

/// Growing answer snapshots of one [`LlmService::execute`] call.
///
/// Dropping the stream cancels the request.
pub struct AnswerStream {
    rx: ReceiverStream<String>,
    _guard: DropGuard,
}

impl Stream for AnswerStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

/// Caller-facing entry point: routes requests for a model to its channels.
#[derive(Clone)]
pub struct LlmService {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServiceConfig,
    registry: ChannelRegistry,
    admission: Arc<AdmissionController>,
    scheduler: RetryScheduler,
    adapters: AdapterSet,
    tools: Arc<ToolRegistry>,
    history: HistoryWindow,
    settings: Settings,
}

impl LlmService {
    /// Service over `stores`, dispatching through `adapters`.
    pub fn new(
        config: ServiceConfig,
        stores: Stores,
        adapters: AdapterSet,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let registry = ChannelRegistry::new(stores.config.clone());
        let admission = Arc::new(AdmissionController::new(
            stores.counters,
            registry.clone(),
            adapters.clone(),
            config.capacity_cache_ttl(),
        ));
        let scheduler = RetryScheduler::new(admission.clone(), registry.clone(), config.retry_delay());
        let history = HistoryWindow::new(
            stores.history,
            config.history_window_minutes,
            config.history_min_messages,
        );
        info!(
            tools = tools.tool_count(),
            max_tool_cycles = config.max_tool_cycles,
            "LLM service ready"
        );
        Self {
            inner: Arc::new(Inner {
                registry,
                admission,
                scheduler,
                adapters,
                tools,
                history,
                settings: Settings::new(stores.config),
                config,
            }),
        }
    }

    /// Answer `message` with `model`, streaming growing snapshots.
    ///
    /// A terminal failure arrives as one `Error: …` line in place of the
    /// answer. Cancelling `cancel` or dropping the stream stops the request.
    pub fn execute(
        &self,
        message: HistoryMessage,
        attachment: Option<Attachment>,
        model: &str,
        cancel: CancellationToken,
    ) -> AnswerStream {
        let (tx, rx) = mpsc::channel(64);
        let token = cancel.child_token();
        let guard = token.clone().drop_guard();
        let inner = self.inner.clone();
        let model = model.to_string();

        tokio::spawn(async move {
            match inner.converse(&message, attachment, &model, &token, &tx).await {
                Ok(outcome) => info!(chat_id = message.chat_id, model = %model, ?outcome, "Request finished"),
                Err(e) => {
                    if e.is_cancelled() {
                        info!(chat_id = message.chat_id, model = %model, "Request cancelled");
                    } else {
                        error!(chat_id = message.chat_id, model = %model, error = %e, "Request failed");
                    }
                    let _ = tx.send(terminal_message(&e, &model)).await;
                }
            }
        });

        AnswerStream {
            rx: ReceiverStream::new(rx),
            _guard: guard,
        }
    }

    /// Describe the image at `path` with the alternate photo model.
    pub async fn analyze_image(
        &self,
        path: impl AsRef<Path>,
        chat_id: i64,
        cancel: CancellationToken,
    ) -> SwitchboardResult<String> {
        let inner = &self.inner;
        let model = inner.settings.alt_photo_model().await?;
        let rounds = inner.settings.max_image_retry_count().await?;
        let path: PathBuf = path.as_ref().to_path_buf();
        info!(chat_id, model = %model, path = %path.display(), "Analyzing image");

        let (model_ref, path_ref, cancel_ref) = (model.as_str(), path.as_path(), &cancel);
        inner
            .scheduler
            .run(&model, rounds, &cancel, move |channel| async move {
                let adapter = inner.adapters.get(channel.provider)?;
                tokio::select! {
                    _ = cancel_ref.cancelled() => Err(SwitchboardError::Cancelled),
                    text = adapter.analyze_image(path_ref, model_ref, &channel) => text,
                }
            })
            .await
    }

    /// Embed `text` with the configured embedding model.
    pub async fn generate_embedding(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> SwitchboardResult<Vec<f32>> {
        let inner = &self.inner;
        let model = inner.settings.embedding_model().await?;
        let rounds = inner.settings.max_image_retry_count().await?;

        let (model_ref, cancel_ref) = (model.as_str(), &cancel);
        let vector = inner
            .scheduler
            .run(&model, rounds, &cancel, move |channel| async move {
                let adapter = inner.adapters.get(channel.provider)?;
                tokio::select! {
                    _ = cancel_ref.cancelled() => Err(SwitchboardError::Cancelled),
                    vector = adapter.embed(text, model_ref, &channel) => vector,
                }
            })
            .await?;

        if vector.is_empty() {
            warn!(model = %model, "Backend returned an empty embedding");
            return Err(SwitchboardError::Backend(format!(
                "model '{model}' returned an empty embedding"
            )));
        }
        Ok(vector)
    }

    /// Spare slots across the channels serving `model`.
    pub async fn available_capacity(&self, model: &str) -> SwitchboardResult<i64> {
        self.inner.admission.available_capacity(model).await
    }

    /// Spare capacity of the alternate photo model.
    pub async fn image_capacity(&self) -> SwitchboardResult<i64> {
        let model = self.inner.settings.alt_photo_model().await?;
        self.available_capacity(&model).await
    }

    /// Models served by a channel.
    pub async fn list_models(&self, channel_id: i64) -> SwitchboardResult<Vec<String>> {
        let channel = self.inner.channel(channel_id).await?;
        self.inner
            .adapters
            .get(channel.provider)?
            .list_models(&channel)
            .await
    }

    /// Models served by a channel, with inferred capabilities.
    pub async fn list_models_with_capabilities(
        &self,
        channel_id: i64,
    ) -> SwitchboardResult<Vec<ModelCapabilities>> {
        let channel = self.inner.channel(channel_id).await?;
        self.inner
            .adapters
            .get(channel.provider)?
            .list_models_with_capabilities(&channel)
            .await
    }

    /// Run the health probe of one channel. Panics in the probe read as unhealthy.
    pub async fn check_health(&self, channel_id: i64) -> SwitchboardResult<bool> {
        let channel = self.inner.channel(channel_id).await?;
        Ok(self.inner.admission.health_check(&channel).await)
    }

    /// Registry the agent loop calls into.
    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }
}

impl Inner {
    async fn channel(&self, channel_id: i64) -> SwitchboardResult<Channel> {
        self.registry.channel(channel_id).await?.ok_or_else(|| {
            SwitchboardError::NotConfigured(format!("channel {channel_id} does not exist"))
        })
    }

    async fn converse(
        &self,
        message: &HistoryMessage,
        attachment: Option<Attachment>,
        model: &str,
        cancel: &CancellationToken,
        snapshots: &mpsc::Sender<String>,
    ) -> SwitchboardResult<LoopOutcome> {
        let rounds = self.settings.max_retry_count().await?;

        let mut transcript = Transcript::new();
        transcript.push(ConversationTurn::system(format_system_prompt(
            &self.config.bot_name,
            message.chat_id,
            &Local::now(),
            &self.tools.render_prompt_xml(),
        )));
        self.history
            .extend(&mut transcript, message, attachment)
            .await?;

        let agent = AgentLoop::new(self.tools.clone(), self.config.max_tool_cycles);
        let ctx = ToolContext::new(message.chat_id);
        let (agent, ctx, transcript) = (&agent, &ctx, &transcript);
        self.scheduler
            .run(model, rounds, cancel, move |channel| {
                let transcript = transcript.clone();
                async move {
                    let adapter = self.adapters.get(channel.provider)?;
                    agent
                        .run(
                            adapter.as_ref(),
                            &channel,
                            model,
                            transcript,
                            ctx,
                            cancel,
                            snapshots,
                        )
                        .await
                }
            })
            .await
    }
}

/// The single line a failed request ends with.
pub fn terminal_message(error: &SwitchboardError, model: &str) -> String {
    match error {
        SwitchboardError::NotConfigured(_) => {
            format!("Error: no channel is configured for model '{model}'.")
        }
        SwitchboardError::CapacityExhausted(_) => {
            format!("Error: every channel serving '{model}' is busy, please try again later.")
        }
        SwitchboardError::Cancelled => "Error: request cancelled.".to_string(),
        other => format!("Error: {other}"),
    }
}
