use super::openai::float_array;
use super::{
    ensure_success, http_err, line_stream, unary_timeout, BackendAdapter, Chunk, ClientCache,
    TextStream,
};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use switchboard_core::{
    Channel, ConversationTurn, Provider, Role, SwitchboardError, SwitchboardResult, Transcript,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Pulls can take a while on a cold server.
const PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Ollama native API backend (`/api/chat`, `/api/embed`, `/api/tags`).
///
/// Models missing on the server are pulled before the first chat or embed.
#[derive(Default)]
pub struct OllamaBackend {
    clients: ClientCache,
}

impl OllamaBackend {
    /// Backend with an empty per-channel client cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, channel: &Channel) -> SwitchboardResult<reqwest::Client> {
        channel.validate()?;
        self.clients.client_for(channel)
    }

    /// Make sure `model` is present on the server, pulling it if needed.
    pub async fn ensure_model(&self, model: &str, channel: &Channel) -> SwitchboardResult<()> {
        if has_model(&self.list_models(channel).await?, model) {
            return Ok(());
        }

        info!(channel = channel.id, model, "Model missing on Ollama server, pulling");
        let resp = self
            .client(channel)?
            .post(format!("{}/api/pull", channel.base_url()))
            .timeout(PULL_TIMEOUT)
            .json(&json!({ "model": model, "stream": false }))
            .send()
            .await
            .map_err(http_err)?;
        ensure_success(resp, Provider::Ollama).await?;

        if has_model(&self.list_models(channel).await?, model) {
            info!(channel = channel.id, model, "Model pulled");
            Ok(())
        } else {
            Err(SwitchboardError::Backend(format!(
                "Model '{model}' is still unavailable on channel {} after pull",
                channel.id
            )))
        }
    }
}

/// `qwen3` matches `qwen3` and `qwen3:latest`; `qwen3:8b` must match exactly.
fn has_model(installed: &[String], model: &str) -> bool {
    let tagged = format!("{model}:");
    installed
        .iter()
        .any(|name| name == model || name.starts_with(&tagged))
}

fn turn_to_message(turn: &ConversationTurn) -> Value {
    let role = match turn.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let mut msg = json!({ "role": role, "content": turn.content });
    if let Some(att) = &turn.attachment {
        msg["images"] = json!([base64::engine::general_purpose::STANDARD.encode(&att.data)]);
    }
    msg
}

/// One NDJSON line of a streamed chat.
fn parse_ndjson_line(line: &str) -> SwitchboardResult<Chunk> {
    let event: Value = serde_json::from_str(line)?;
    if let Some(err) = event["error"].as_str() {
        return Err(SwitchboardError::Backend(format!("Ollama error: {err}")));
    }
    let text = event["message"]["content"].as_str().unwrap_or_default();
    if event["done"].as_bool().unwrap_or(false) {
        // the closing line may still carry a final fragment
        return Ok(if text.is_empty() {
            Chunk::Done
        } else {
            Chunk::Text(text.to_string())
        });
    }
    Ok(Chunk::Text(text.to_string()))
}

#[async_trait]
impl BackendAdapter for OllamaBackend {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn stream_execute(
        &self,
        transcript: &Transcript,
        model: &str,
        channel: &Channel,
        cancel: CancellationToken,
    ) -> SwitchboardResult<TextStream> {
        self.ensure_model(model, channel).await?;
        let messages: Vec<Value> = transcript.turns().iter().map(turn_to_message).collect();
        debug!(channel = channel.id, model, turns = messages.len(), "Ollama chat request");

        let resp = self
            .client(channel)?
            .post(format!("{}/api/chat", channel.base_url()))
            .json(&json!({ "model": model, "messages": messages, "stream": true }))
            .send()
            .await
            .map_err(http_err)?;
        let resp = ensure_success(resp, Provider::Ollama).await?;
        Ok(line_stream(resp, cancel, parse_ndjson_line))
    }

    async fn embed(
        &self,
        text: &str,
        model: &str,
        channel: &Channel,
    ) -> SwitchboardResult<Vec<f32>> {
        self.ensure_model(model, channel).await?;
        let resp = self
            .client(channel)?
            .post(format!("{}/api/embed", channel.base_url()))
            .timeout(unary_timeout(channel))
            .json(&json!({ "model": model, "input": text }))
            .send()
            .await
            .map_err(http_err)?;
        let body: Value = ensure_success(resp, Provider::Ollama)
            .await?
            .json()
            .await
            .map_err(http_err)?;
        let vector = float_array(&body["embeddings"][0]);
        if vector.is_empty() {
            return Err(SwitchboardError::Backend(format!(
                "Ollama returned no embedding for model '{model}'"
            )));
        }
        Ok(vector)
    }

    async fn list_models(&self, channel: &Channel) -> SwitchboardResult<Vec<String>> {
        let resp = self
            .client(channel)?
            .get(format!("{}/api/tags", channel.base_url()))
            .timeout(unary_timeout(channel))
            .send()
            .await
            .map_err(http_err)?;
        let body: Value = ensure_success(resp, Provider::Ollama)
            .await?
            .json()
            .await
            .map_err(http_err)?;
        Ok(body["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}
