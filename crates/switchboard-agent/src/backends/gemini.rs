use super::openai::float_array;
use super::{
    ensure_success, http_err, line_stream, unary_timeout, BackendAdapter, Chunk, ClientCache,
    TextStream,
};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use switchboard_core::{
    Channel, ConversationTurn, Provider, Role, SwitchboardError, SwitchboardResult, Transcript,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Gemini generative language API backend.
///
/// The channel endpoint is the API host, e.g.
/// `https://generativelanguage.googleapis.com`.
#[derive(Default)]
pub struct GeminiBackend {
    clients: ClientCache,
}

impl GeminiBackend {
    /// Backend with an empty per-channel client cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, channel: &Channel) -> SwitchboardResult<reqwest::Client> {
        channel.validate()?;
        self.clients.client_for(channel)
    }

    /// System turns are folded into `systemInstruction`; the rest become `contents`.
    fn build_body(transcript: &Transcript) -> Value {
        let system: Vec<&str> = transcript
            .turns()
            .iter()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
            .collect();
        let contents: Vec<Value> = transcript
            .turns()
            .iter()
            .filter(|t| t.role != Role::System)
            .map(turn_to_content)
            .collect();

        let mut body = json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
        }
        body
    }
}

fn turn_to_content(turn: &ConversationTurn) -> Value {
    let role = if turn.role == Role::Assistant { "model" } else { "user" };
    let mut parts = vec![json!({ "text": turn.content })];
    if let Some(att) = &turn.attachment {
        parts.push(json!({
            "inline_data": {
                "mime_type": att.mime_type,
                "data": base64::engine::general_purpose::STANDARD.encode(&att.data),
            }
        }));
    }
    json!({ "role": role, "parts": parts })
}

fn parse_sse_line(line: &str) -> SwitchboardResult<Chunk> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Chunk::Skip);
    };
    let event: Value = match serde_json::from_str(data.trim()) {
        Ok(v) => v,
        Err(_) => return Ok(Chunk::Skip),
    };
    if let Some(err) = event.get("error") {
        return Err(SwitchboardError::Backend(format!("Gemini stream error: {err}")));
    }
    let text: String = event["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();
    Ok(Chunk::Text(text))
}

#[async_trait]
impl BackendAdapter for GeminiBackend {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn stream_execute(
        &self,
        transcript: &Transcript,
        model: &str,
        channel: &Channel,
        cancel: CancellationToken,
    ) -> SwitchboardResult<TextStream> {
        let client = self.client(channel)?;
        debug!(channel = channel.id, model, turns = transcript.len(), "Gemini chat request");
        let resp = client
            .post(format!(
                "{}/v1beta/models/{model}:streamGenerateContent",
                channel.base_url()
            ))
            .query(&[("alt", "sse")])
            .header(API_KEY_HEADER, channel.api_key.as_str())
            .json(&Self::build_body(transcript))
            .send()
            .await
            .map_err(http_err)?;
        let resp = ensure_success(resp, Provider::Gemini).await?;
        Ok(line_stream(resp, cancel, parse_sse_line))
    }

    async fn embed(
        &self,
        text: &str,
        model: &str,
        channel: &Channel,
    ) -> SwitchboardResult<Vec<f32>> {
        let client = self.client(channel)?;
        let resp = client
            .post(format!(
                "{}/v1beta/models/{model}:embedContent",
                channel.base_url()
            ))
            .header(API_KEY_HEADER, channel.api_key.as_str())
            .timeout(unary_timeout(channel))
            .json(&json!({ "content": { "parts": [{ "text": text }] } }))
            .send()
            .await
            .map_err(http_err)?;
        let body: Value = ensure_success(resp, Provider::Gemini)
            .await?
            .json()
            .await
            .map_err(http_err)?;
        let vector = float_array(&body["embedding"]["values"]);
        if vector.is_empty() {
            return Err(SwitchboardError::Backend(format!(
                "Gemini returned no embedding for model '{model}'"
            )));
        }
        Ok(vector)
    }

    async fn list_models(&self, channel: &Channel) -> SwitchboardResult<Vec<String>> {
        let client = self.client(channel)?;
        let resp = client
            .get(format!("{}/v1beta/models", channel.base_url()))
            .header(API_KEY_HEADER, channel.api_key.as_str())
            .timeout(unary_timeout(channel))
            .send()
            .await
            .map_err(http_err)?;
        let body: Value = ensure_success(resp, Provider::Gemini)
            .await?
            .json()
            .await
            .map_err(http_err)?;
        Ok(body["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str())
                    .map(|n| n.trim_start_matches("models/").to_string())
                    .collect()
            })
            .unwrap_or_default())
    }
}
