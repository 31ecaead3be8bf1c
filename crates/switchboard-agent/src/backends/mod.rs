/// Google Gemini.
pub mod gemini;
/// Ollama, with on-demand model pulls.
pub mod ollama;
/// OpenAI-compatible chat completions.
pub mod openai;
/// Deterministic in-process backend.
pub mod scripted;

use crate::capabilities::{infer_capabilities, ModelCapabilities};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{
    Attachment, Channel, ConversationTurn, Provider, SwitchboardError, SwitchboardResult,
    Transcript,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use scripted::ScriptedBackend;

/// Ordered text deltas produced by one streamed completion.
pub type TextStream = Pin<Box<dyn Stream<Item = SwitchboardResult<String>> + Send>>;

const IMAGE_PROMPT: &str = "Describe this image in detail. If it contains any text, transcribe it verbatim.";

/// Uniform contract every provider family implements to take part in routing.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `BackendAdapter` for your struct
/// 3. Add the variant to `Provider` in `switchboard-core`
/// 4. Register it in `AdapterSet::with_defaults()`
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Provider family served by this adapter.
    fn provider(&self) -> Provider;

    /// Start a streamed completion. The returned stream stops promptly once
    /// `cancel` fires or the stream is dropped.
    async fn stream_execute(
        &self,
        transcript: &Transcript,
        model: &str,
        channel: &Channel,
        cancel: CancellationToken,
    ) -> SwitchboardResult<TextStream>;

    /// Embed `text` into a vector. An empty answer is an error.
    async fn embed(&self, text: &str, model: &str, channel: &Channel)
        -> SwitchboardResult<Vec<f32>>;

    /// Describe the image at `path`.
    async fn analyze_image(
        &self,
        path: &Path,
        model: &str,
        channel: &Channel,
    ) -> SwitchboardResult<String> {
        let data = tokio::fs::read(path).await?;
        let attachment = Attachment::new(Attachment::image_mime_for(path), data);
        let mut transcript = Transcript::new();
        transcript.push(ConversationTurn::user(IMAGE_PROMPT).with_attachment(attachment));
        let stream = self
            .stream_execute(&transcript, model, channel, CancellationToken::new())
            .await?;
        collect_text(stream).await
    }

    /// Model identifiers the channel serves.
    async fn list_models(&self, channel: &Channel) -> SwitchboardResult<Vec<String>>;

    /// Cheap liveness probe. The default lists models.
    async fn is_healthy(&self, channel: &Channel) -> bool {
        match self.list_models(channel).await {
            Ok(_) => true,
            Err(e) => {
                warn!(channel = channel.id, error = %e, "Health probe failed");
                false
            }
        }
    }

    /// Model identifiers annotated with capabilities inferred from their names.
    async fn list_models_with_capabilities(
        &self,
        channel: &Channel,
    ) -> SwitchboardResult<Vec<ModelCapabilities>> {
        let provider = self.provider();
        Ok(self
            .list_models(channel)
            .await?
            .into_iter()
            .map(|m| infer_capabilities(provider, &m))
            .collect())
    }
}

/// Drain a text stream into one string.
pub async fn collect_text(mut stream: TextStream) -> SwitchboardResult<String> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        text.push_str(&delta?);
    }
    Ok(text)
}

/// Adapters keyed by provider family.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<Provider, Arc<dyn BackendAdapter>>,
}

impl AdapterSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// One HTTP adapter for every built-in provider.
    pub fn with_defaults() -> Self {
        let mut set = Self::new();
        set.register(Arc::new(OpenAiBackend::new()));
        set.register(Arc::new(OllamaBackend::new()));
        set.register(Arc::new(GeminiBackend::new()));
        set
    }

    /// Add or replace the adapter for its provider.
    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    /// Adapter for `provider`, `NotConfigured` when none is registered.
    pub fn get(&self, provider: Provider) -> SwitchboardResult<Arc<dyn BackendAdapter>> {
        self.adapters.get(&provider).cloned().ok_or_else(|| {
            SwitchboardError::NotConfigured(format!("no adapter for provider '{provider}'"))
        })
    }
}

type ClientKey = (i64, Option<String>, u64);

/// HTTP clients built per channel, so proxy and timeout settings apply.
#[derive(Default)]
pub(crate) struct ClientCache {
    clients: Mutex<HashMap<ClientKey, reqwest::Client>>,
}

impl ClientCache {
    /// Client for `channel`. The connect timeout is the channel timeout;
    /// unary calls also apply it to the whole request via [`unary_timeout`].
    pub(crate) fn client_for(&self, channel: &Channel) -> SwitchboardResult<reqwest::Client> {
        let key = (channel.id, channel.proxy.clone(), channel.timeout_secs);
        if let Some(client) = self.clients.lock().get(&key) {
            return Ok(client.clone());
        }

        let mut builder =
            reqwest::Client::builder().connect_timeout(Duration::from_secs(channel.timeout_secs));
        if let Some(proxy) = channel.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                SwitchboardError::Config(format!("Invalid proxy for channel {}: {e}", channel.id))
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| SwitchboardError::Http(e.to_string()))?;
        debug!(channel = channel.id, "Built HTTP client");
        self.clients.lock().insert(key, client.clone());
        Ok(client)
    }
}

/// Whole-request timeout for non-streaming calls.
pub(crate) fn unary_timeout(channel: &Channel) -> Duration {
    Duration::from_secs(channel.timeout_secs)
}

/// Transport error without the request URL, which may carry credentials.
pub(crate) fn http_err(e: reqwest::Error) -> SwitchboardError {
    SwitchboardError::Http(e.without_url().to_string())
}

/// Turn a non-success status into a `Backend` error carrying the body.
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
    provider: Provider,
) -> SwitchboardResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(SwitchboardError::Backend(format!(
        "{provider} API error {status}: {body}"
    )))
}

/// What one line of a streamed body means.
pub(crate) enum Chunk {
    Text(String),
    Skip,
    Done,
}

/// Spawn a reader that splits the response body into lines, parses each one
/// and forwards text deltas. The reader stops when `cancel` fires, the
/// receiver is dropped, a line parses to `Done` or the body ends.
pub(crate) fn line_stream<F>(
    resp: reqwest::Response,
    cancel: CancellationToken,
    parse: F,
) -> TextStream
where
    F: Fn(&str) -> SwitchboardResult<Chunk> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel::<SwitchboardResult<String>>(64);

    tokio::spawn(async move {
        let mut body = resp.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = tx.send(Err(SwitchboardError::Cancelled)).await;
                    return;
                }
                _ = tx.closed() => return,
                next = body.next() => next,
            };

            let chunk = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    let _ = tx
                        .send(Err(SwitchboardError::Http(format!("Stream read error: {e}"))))
                        .await;
                    return;
                }
                None => break,
            };

            buffer.extend_from_slice(&chunk);
            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                if !forward_line(&line, &parse, &tx).await {
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            forward_line(&buffer, &parse, &tx).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Returns `false` once the reader should stop.
async fn forward_line<F>(
    raw: &[u8],
    parse: &F,
    tx: &mpsc::Sender<SwitchboardResult<String>>,
) -> bool
where
    F: Fn(&str) -> SwitchboardResult<Chunk>,
{
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    match parse(line) {
        Ok(Chunk::Text(text)) if text.is_empty() => true,
        Ok(Chunk::Text(text)) => tx.send(Ok(text)).await.is_ok(),
        Ok(Chunk::Skip) => true,
        Ok(Chunk::Done) => false,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
