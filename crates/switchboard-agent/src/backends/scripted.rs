use super::{BackendAdapter, TextStream};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use switchboard_core::{Channel, Provider, SwitchboardError, SwitchboardResult, Transcript};
use tokio_util::sync::CancellationToken;

/// One scripted reply: the deltas to stream, or an error to fail with.
pub type ScriptedReply = SwitchboardResult<Vec<String>>;

/// A backend that replays pre-configured replies, for tests and dry runs.
///
/// Every `stream_execute` pops the next reply and records the transcript it
/// was given. Once the script is empty it streams an empty reply.
pub struct ScriptedBackend {
    provider: Provider,
    replies: Mutex<VecDeque<ScriptedReply>>,
    transcripts: Mutex<Vec<Transcript>>,
    calls: AtomicUsize,
    healthy: AtomicBool,
    panic_on_health: AtomicBool,
    embedding: Mutex<Vec<f32>>,
}

impl ScriptedBackend {
    /// Healthy backend with no queued replies.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            replies: Mutex::new(VecDeque::new()),
            transcripts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            panic_on_health: AtomicBool::new(false),
            embedding: Mutex::new(vec![0.1, 0.2, 0.3]),
        }
    }

    /// Queue a reply streamed as the given deltas.
    pub fn reply<I, S>(self, deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies
            .lock()
            .push_back(Ok(deltas.into_iter().map(Into::into).collect()));
        self
    }

    /// Queue a dispatch failure.
    pub fn fail(self, error: SwitchboardError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    /// Vector returned by `embed`.
    pub fn with_embedding(self, vector: Vec<f32>) -> Self {
        *self.embedding.lock() = vector;
        self
    }

    /// Answer for the health probe.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make the health probe panic instead of answering.
    pub fn set_panic_on_health(&self, panic: bool) {
        self.panic_on_health.store(panic, Ordering::SeqCst);
    }

    /// Number of `stream_execute` and `embed` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Transcripts passed to `stream_execute`, in call order.
    pub fn transcripts(&self) -> Vec<Transcript> {
        self.transcripts.lock().clone()
    }
}

#[async_trait]
impl BackendAdapter for ScriptedBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn stream_execute(
        &self,
        transcript: &Transcript,
        _model: &str,
        _channel: &Channel,
        _cancel: CancellationToken,
    ) -> SwitchboardResult<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcripts.lock().push(transcript.clone());
        let reply = self.replies.lock().pop_front().unwrap_or(Ok(Vec::new()));
        let deltas = reply?;
        Ok(Box::pin(futures_util::stream::iter(
            deltas.into_iter().map(Ok),
        )))
    }

    async fn embed(
        &self,
        _text: &str,
        _model: &str,
        _channel: &Channel,
    ) -> SwitchboardResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock();
        if matches!(replies.front(), Some(Err(_))) {
            if let Some(Err(e)) = replies.pop_front() {
                return Err(e);
            }
        }
        Ok(self.embedding.lock().clone())
    }

    async fn list_models(&self, _channel: &Channel) -> SwitchboardResult<Vec<String>> {
        Ok(vec!["scripted".to_string()])
    }

    async fn is_healthy(&self, _channel: &Channel) -> bool {
        if self.panic_on_health.load(Ordering::SeqCst) {
            panic!("scripted health probe panicked");
        }
        self.healthy.load(Ordering::SeqCst)
    }
}
