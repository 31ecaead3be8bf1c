#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests of LlmService over scripted backends and an in-memory store.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use switchboard_agent::{
    AdapterSet, BackendAdapter, LlmService, ScriptedBackend, ServiceConfig, Stores, TextStream,
    EXHAUSTED_MESSAGE,
};
use switchboard_core::{
    Channel, HistoryMessage, Provider, Role, SwitchboardError, SwitchboardResult, Transcript,
};
use switchboard_store::config::{MAX_IMAGE_RETRY_COUNT, MAX_RETRY_COUNT};
use switchboard_store::{ConfigStore, CounterStore, MemoryStore};
use switchboard_tools::{FnTool, ParamSpec, ParamType, ToolDescriptor, ToolOutput, ToolRegistry};
use tokio_util::sync::CancellationToken;

// --- Fixtures ---

fn channel(id: i64, provider: Provider, priority: i32, parallelism: u32) -> Channel {
    Channel {
        id,
        name: format!("ch{id}"),
        provider,
        endpoint: "http://backend".into(),
        api_key: "key".into(),
        parallelism,
        priority,
        proxy: None,
        timeout_secs: 60,
    }
}

fn weather_tools() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FnTool::new(
        ToolDescriptor::new("weather", "Current weather for a city")
            .param(ParamSpec::required("city", ParamType::String, "City name")),
        |args, _ctx| async move { Ok(ToolOutput::Text(format!("rain in {}", args.get_str("city")?))) },
    )));
    Arc::new(registry)
}

fn config(max_tool_cycles: u32) -> ServiceConfig {
    ServiceConfig {
        max_tool_cycles,
        retry_delay_ms: 0,
        ..ServiceConfig::default()
    }
}

fn adapters(backends: &[&Arc<ScriptedBackend>]) -> AdapterSet {
    let mut set = AdapterSet::new();
    for backend in backends {
        set.register((*backend).clone());
    }
    set
}

fn hanging() -> AdapterSet {
    let mut set = AdapterSet::new();
    set.register(Arc::new(HangingBackend));
    set
}

fn service(store: &Arc<MemoryStore>, adapters: AdapterSet, max_tool_cycles: u32) -> LlmService {
    LlmService::new(
        config(max_tool_cycles),
        Stores::shared(store.clone()),
        adapters,
        weather_tools(),
    )
}

fn message(content: &str) -> HistoryMessage {
    HistoryMessage {
        message_id: 100,
        chat_id: 42,
        sender_name: "alice".into(),
        content: content.into(),
        sent_at: Utc::now(),
        reply_to: None,
        from_bot: false,
    }
}

async fn ask(service: &LlmService, model: &str) -> Vec<String> {
    service
        .execute(message("weather in Lima?"), None, model, CancellationToken::new())
        .collect()
        .await
}

async fn inflight(store: &MemoryStore, id: i64) -> i64 {
    store
        .get(&format!("channel:{id}:inflight"))
        .await
        .unwrap()
        .unwrap_or(0)
}

// --- Agent loop through the service ---

#[tokio::test]
async fn test_tool_call_then_final_answer() {
    let store = Arc::new(MemoryStore::new().with_channel(channel(1, Provider::Ollama, 0, 1), &["m"]));
    let backend = Arc::new(
        ScriptedBackend::new(Provider::Ollama)
            .reply(["<tool name=\"weather\"><parameters><parameter name=\"city\">Lima</parameter></parameters></tool>"])
            .reply(["final ", "answer"]),
    );
    let service = service(&store, adapters(&[&backend]), 5);

    let snapshots = ask(&service, "m").await;
    assert_eq!(snapshots.last().unwrap(), "final answer");
    assert_eq!(backend.calls(), 2);

    let transcripts = backend.transcripts();
    let first = transcripts[0].turns();
    assert_eq!(first[0].role, Role::System);
    assert!(first[0].content.contains("<tool name=\"weather\">"));
    assert!(first.last().unwrap().content.ends_with("alice: weather in Lima?"));

    let feedback: Vec<_> = transcripts[1]
        .turns()
        .iter()
        .filter(|t| t.content.starts_with("[Executed Tool"))
        .collect();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].content, "[Executed Tool 'weather'. Result: rain in Lima]");
    assert_eq!(inflight(&store, 1).await, 0);
}

#[tokio::test]
async fn test_exhaustion_message_and_no_further_calls() {
    let store = Arc::new(MemoryStore::new().with_channel(channel(1, Provider::Ollama, 0, 1), &["m"]));
    let call = "<weather><city>Lima</city></weather>";
    let backend = Arc::new(
        ScriptedBackend::new(Provider::Ollama)
            .reply([call])
            .reply([call])
            .reply(["unused"]),
    );
    let service = service(&store, adapters(&[&backend]), 2);

    let snapshots = ask(&service, "m").await;
    assert_eq!(snapshots.last().unwrap(), EXHAUSTED_MESSAGE);
    assert_eq!(backend.calls(), 2);
}

// --- Routing ---

#[tokio::test]
async fn test_higher_priority_channel_is_dispatched() {
    let store = Arc::new(
        MemoryStore::new()
            .with_channel(channel(2, Provider::OpenAi, 5, 1), &["m"])
            .with_channel(channel(1, Provider::Ollama, 10, 1), &["m"]),
    );
    let high = Arc::new(ScriptedBackend::new(Provider::Ollama).reply(["from high"]));
    let low = Arc::new(ScriptedBackend::new(Provider::OpenAi).reply(["from low"]));
    let service = service(&store, adapters(&[&high, &low]), 5);

    let snapshots = ask(&service, "m").await;
    assert_eq!(snapshots.last().unwrap(), "from high");
    assert_eq!(high.calls(), 1);
    assert_eq!(low.calls(), 0);
}

#[tokio::test]
async fn test_panicking_health_check_skips_channel() {
    let store = Arc::new(
        MemoryStore::new()
            .with_channel(channel(1, Provider::Ollama, 10, 1), &["m"])
            .with_channel(channel(2, Provider::OpenAi, 5, 1), &["m"]),
    );
    let broken = Arc::new(ScriptedBackend::new(Provider::Ollama).reply(["never"]));
    broken.set_panic_on_health(true);
    let fallback = Arc::new(ScriptedBackend::new(Provider::OpenAi).reply(["fallback"]));
    let service = service(&store, adapters(&[&broken, &fallback]), 5);

    let snapshots = ask(&service, "m").await;
    assert_eq!(snapshots.last().unwrap(), "fallback");
    assert_eq!(broken.calls(), 0);
    assert_eq!(inflight(&store, 1).await, 0);
    assert_eq!(inflight(&store, 2).await, 0);
}

#[tokio::test]
async fn test_dispatch_failure_restores_counter_and_is_not_retried() {
    let store = Arc::new(
        MemoryStore::new()
            .with_channel(channel(1, Provider::Ollama, 10, 1), &["m"])
            .with_channel(channel(2, Provider::OpenAi, 5, 1), &["m"]),
    );
    let failing = Arc::new(
        ScriptedBackend::new(Provider::Ollama).fail(SwitchboardError::Http("connection reset".into())),
    );
    let other = Arc::new(ScriptedBackend::new(Provider::OpenAi).reply(["unused"]));
    let service = service(&store, adapters(&[&failing, &other]), 5);

    let snapshots = ask(&service, "m").await;
    assert_eq!(snapshots, vec!["Error: HTTP error: connection reset".to_string()]);
    assert_eq!(other.calls(), 0);
    assert_eq!(inflight(&store, 1).await, 0);
}

// --- Terminal errors ---

#[tokio::test]
async fn test_unknown_model_reports_not_configured() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store, AdapterSet::new(), 5);
    let snapshots = ask(&service, "ghost").await;
    assert_eq!(
        snapshots,
        vec!["Error: no channel is configured for model 'ghost'.".to_string()]
    );
}

#[tokio::test]
async fn test_busy_channels_report_capacity_exhausted() {
    let store = Arc::new(MemoryStore::new().with_channel(channel(1, Provider::Ollama, 0, 1), &["m"]));
    store.set_setting(MAX_RETRY_COUNT, "3").await.unwrap();
    store.set("channel:1:inflight", 1).await.unwrap();
    let backend = Arc::new(ScriptedBackend::new(Provider::Ollama));
    let service = service(&store, adapters(&[&backend]), 5);

    let snapshots = ask(&service, "m").await;
    assert_eq!(
        snapshots,
        vec!["Error: every channel serving 'm' is busy, please try again later.".to_string()]
    );
    assert_eq!(backend.calls(), 0);
    assert_eq!(inflight(&store, 1).await, 1);
}

#[tokio::test]
async fn test_cancelled_token_reports_cancellation() {
    let store = Arc::new(MemoryStore::new().with_channel(channel(1, Provider::Ollama, 0, 1), &["m"]));
    let backend = Arc::new(ScriptedBackend::new(Provider::Ollama).reply(["hi"]));
    let service = service(&store, adapters(&[&backend]), 5);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let snapshots: Vec<String> = service
        .execute(message("hi"), None, "m", cancel)
        .collect()
        .await;
    assert_eq!(snapshots, vec!["Error: request cancelled.".to_string()]);
    assert_eq!(backend.calls(), 0);
}

// --- Cancellation by dropping the stream ---

/// Streams nothing, forever.
struct HangingBackend;

#[async_trait]
impl BackendAdapter for HangingBackend {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn stream_execute(
        &self,
        _transcript: &Transcript,
        _model: &str,
        _channel: &Channel,
        _cancel: CancellationToken,
    ) -> SwitchboardResult<TextStream> {
        Ok(Box::pin(futures_util::stream::pending::<SwitchboardResult<String>>()))
    }

    async fn embed(&self, _text: &str, _model: &str, _channel: &Channel) -> SwitchboardResult<Vec<f32>> {
        futures_util::future::pending().await
    }

    async fn list_models(&self, _channel: &Channel) -> SwitchboardResult<Vec<String>> {
        Ok(vec![])
    }
}

async fn wait_for_inflight(store: &MemoryStore, id: i64, expected: i64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while inflight(store, id).await != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("in-flight counter never reached the expected value");
}

#[tokio::test]
async fn test_dropping_stream_cancels_and_releases() {
    let store = Arc::new(MemoryStore::new().with_channel(channel(1, Provider::Gemini, 0, 1), &["m"]));
    let service = service(&store, hanging(), 5);

    let stream = service.execute(message("hello?"), None, "m", CancellationToken::new());
    wait_for_inflight(&store, 1, 1).await;
    drop(stream);
    wait_for_inflight(&store, 1, 0).await;
}

#[tokio::test]
async fn test_cancelling_embedding_releases_slot() {
    let store = Arc::new(
        MemoryStore::new().with_channel(channel(1, Provider::Gemini, 0, 1), &["bge-m3:latest"]),
    );
    let service = service(&store, hanging(), 5);
    let cancel = CancellationToken::new();

    let task = {
        let service = service.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { service.generate_embedding("text", cancel).await })
    };
    wait_for_inflight(&store, 1, 1).await;
    cancel.cancel();
    let result = task.await.unwrap();
    assert!(matches!(result, Err(SwitchboardError::Cancelled)));
    assert_eq!(inflight(&store, 1).await, 0);
}

// --- Single-shot operations ---

#[tokio::test]
async fn test_generate_embedding() {
    let store = Arc::new(
        MemoryStore::new().with_channel(channel(1, Provider::Ollama, 0, 2), &["bge-m3:latest"]),
    );
    let backend = Arc::new(ScriptedBackend::new(Provider::Ollama).with_embedding(vec![0.5, 0.25]));
    let service = service(&store, adapters(&[&backend]), 5);

    let vector = service
        .generate_embedding("hello", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(vector, vec![0.5, 0.25]);
    assert_eq!(
        store.get_setting("LLM:EmbeddingModelName").await.unwrap().as_deref(),
        Some("bge-m3:latest")
    );
}

#[tokio::test]
async fn test_empty_embedding_is_an_error() {
    let store = Arc::new(
        MemoryStore::new().with_channel(channel(1, Provider::Ollama, 0, 2), &["bge-m3:latest"]),
    );
    let backend = Arc::new(ScriptedBackend::new(Provider::Ollama).with_embedding(vec![]));
    let service = service(&store, adapters(&[&backend]), 5);

    let result = service.generate_embedding("hello", CancellationToken::new()).await;
    assert!(matches!(result, Err(SwitchboardError::Backend(_))));
    assert_eq!(inflight(&store, 1).await, 0);
}

#[tokio::test]
async fn test_embedding_without_channel_is_not_configured() {
    let store = Arc::new(MemoryStore::new());
    store.set_setting(MAX_IMAGE_RETRY_COUNT, "1").await.unwrap();
    let service = service(&store, AdapterSet::new(), 5);
    let result = service.generate_embedding("hello", CancellationToken::new()).await;
    assert!(matches!(result, Err(SwitchboardError::NotConfigured(_))));
}

#[tokio::test]
async fn test_analyze_image_uses_alt_photo_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cat.png");
    std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

    let store = Arc::new(
        MemoryStore::new().with_channel(channel(1, Provider::Ollama, 0, 1), &["gemma3:27b"]),
    );
    let backend = Arc::new(ScriptedBackend::new(Provider::Ollama).reply(["a ", "cat"]));
    let service = service(&store, adapters(&[&backend]), 5);

    let text = service
        .analyze_image(&path, 42, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(text, "a cat");

    let binding = backend.transcripts();
    let turn = &binding[0].turns()[0];
    assert_eq!(turn.attachment.as_ref().unwrap().mime_type, "image/png");
    assert_eq!(service.image_capacity().await.unwrap(), 1);
}

// --- Operator queries ---

#[tokio::test]
async fn test_capacity_and_operator_queries() {
    let store = Arc::new(
        MemoryStore::new()
            .with_channel(channel(1, Provider::Ollama, 0, 3), &["m"])
            .with_channel(channel(2, Provider::OpenAi, 0, 2), &["m"]),
    );
    let ollama = Arc::new(ScriptedBackend::new(Provider::Ollama));
    let openai = Arc::new(ScriptedBackend::new(Provider::OpenAi));
    openai.set_healthy(false);
    let service = service(&store, adapters(&[&ollama, &openai]), 5);

    assert_eq!(service.available_capacity("m").await.unwrap(), 5);
    store.set("channel:1:inflight", 2).await.unwrap();
    assert_eq!(service.available_capacity("m").await.unwrap(), 3);
    assert_eq!(service.available_capacity("nobody").await.unwrap(), 0);

    assert!(service.check_health(1).await.unwrap());
    assert!(!service.check_health(2).await.unwrap());
    assert!(matches!(
        service.check_health(99).await,
        Err(SwitchboardError::NotConfigured(_))
    ));

    assert_eq!(service.list_models(1).await.unwrap(), vec!["scripted".to_string()]);
    let caps = service.list_models_with_capabilities(1).await.unwrap();
    assert_eq!(caps.len(), 1);
    assert!(caps[0].streaming);
}
