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

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, vLLM, LM Studio and any other server
/// implementing the chat completions API. The channel endpoint is the API
/// root including its version segment, e.g. `https://api.openai.com/v1`.
#[derive(Default)]
pub struct OpenAiBackend {
    clients: ClientCache,
}

impl OpenAiBackend {
    /// Backend with an empty per-channel client cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn build_messages(transcript: &Transcript) -> Vec<Value> {
        transcript.turns().iter().map(turn_to_message).collect()
    }

    fn request(
        &self,
        channel: &Channel,
        method: reqwest::Method,
        path: &str,
    ) -> SwitchboardResult<reqwest::RequestBuilder> {
        channel.validate()?;
        let client = self.clients.client_for(channel)?;
        let url = format!("{}/{path}", channel.base_url());
        Ok(client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", channel.api_key)))
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn turn_to_message(turn: &ConversationTurn) -> Value {
    match &turn.attachment {
        Some(att) => {
            let data = base64::engine::general_purpose::STANDARD.encode(&att.data);
            json!({
                "role": role_name(turn.role),
                "content": [
                    { "type": "text", "text": turn.content },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:{};base64,{data}", att.mime_type) }
                    }
                ]
            })
        }
        None => json!({ "role": role_name(turn.role), "content": turn.content }),
    }
}

/// One SSE line of a streamed chat completion.
fn parse_sse_line(line: &str) -> SwitchboardResult<Chunk> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Chunk::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Chunk::Done);
    }
    let event: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Ok(Chunk::Skip),
    };
    if let Some(err) = event.get("error") {
        return Err(SwitchboardError::Backend(format!("OpenAI stream error: {err}")));
    }
    Ok(event["choices"][0]["delta"]["content"]
        .as_str()
        .map_or(Chunk::Skip, |t| Chunk::Text(t.to_string())))
}

#[async_trait]
impl BackendAdapter for OpenAiBackend {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn stream_execute(
        &self,
        transcript: &Transcript,
        model: &str,
        channel: &Channel,
        cancel: CancellationToken,
    ) -> SwitchboardResult<TextStream> {
        let body = json!({
            "model": model,
            "messages": Self::build_messages(transcript),
            "stream": true,
        });
        debug!(channel = channel.id, model, turns = transcript.len(), "OpenAI chat request");

        let resp = self
            .request(channel, reqwest::Method::POST, "chat/completions")?
            .json(&body)
            .send()
            .await
            .map_err(http_err)?;
        let resp = ensure_success(resp, Provider::OpenAi).await?;
        Ok(line_stream(resp, cancel, parse_sse_line))
    }

    async fn embed(
        &self,
        text: &str,
        model: &str,
        channel: &Channel,
    ) -> SwitchboardResult<Vec<f32>> {
        let resp = self
            .request(channel, reqwest::Method::POST, "embeddings")?
            .timeout(unary_timeout(channel))
            .json(&json!({ "model": model, "input": text }))
            .send()
            .await
            .map_err(http_err)?;
        let body: Value = ensure_success(resp, Provider::OpenAi)
            .await?
            .json()
            .await
            .map_err(http_err)?;
        let vector = float_array(&body["data"][0]["embedding"]);
        if vector.is_empty() {
            return Err(SwitchboardError::Backend(format!(
                "OpenAI returned no embedding for model '{model}'"
            )));
        }
        Ok(vector)
    }

    async fn list_models(&self, channel: &Channel) -> SwitchboardResult<Vec<String>> {
        let resp = self
            .request(channel, reqwest::Method::GET, "models")?
            .timeout(unary_timeout(channel))
            .send()
            .await
            .map_err(http_err)?;
        let body: Value = ensure_success(resp, Provider::OpenAi)
            .await?
            .json()
            .await
            .map_err(http_err)?;
        Ok(body["data"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// JSON number array as `f32`s; anything else reads as empty.
pub(crate) fn float_array(value: &Value) -> Vec<f32> {
    value
        .as_array()
        .map(|xs| {
            xs.iter()
                .filter_map(Value::as_f64)
                .map(|x| x as f32)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backends::collect_text;
    use switchboard_core::Attachment;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> Channel {
        Channel {
            id: 1,
            name: "openai".into(),
            provider: Provider::OpenAi,
            endpoint: format!("{}/v1/", server.uri()),
            api_key: "sk-test".into(),
            parallelism: 2,
            priority: 0,
            proxy: None,
            timeout_secs: 10,
        }
    }

    fn transcript() -> Transcript {
        let mut t = Transcript::new();
        t.push(ConversationTurn::system("be brief"));
        t.push(ConversationTurn::user("hi"));
        t
    }

    #[tokio::test]
    async fn test_stream_execute_reads_sse_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new();
        let stream = backend
            .stream_execute(&transcript(), "gpt-4o", &channel(&server), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(collect_text(stream).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_server_error_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = OpenAiBackend::new()
            .stream_execute(&transcript(), "gpt-4o", &channel(&server), CancellationToken::new())
            .await;
        match result {
            Err(SwitchboardError::Backend(msg)) => assert!(msg.contains("boom")),
            _ => panic!("expected backend error"),
        }
    }

    #[tokio::test]
    async fn test_embed_and_empty_embedding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"embedding": [0.5, -1.0, 2.0]}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(json!({"model": "empty"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new();
        let ch = channel(&server);
        let v = backend
            .embed("hello", "text-embedding-3-small", &ch)
            .await
            .unwrap();
        assert_eq!(v, vec![0.5, -1.0, 2.0]);
        assert!(matches!(
            backend.embed("hello", "empty", &ch).await,
            Err(SwitchboardError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_list_models_and_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"id": "gpt-4o"}, {"id": "text-embedding-3-small"}]})),
            )
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new();
        let ch = channel(&server);
        assert_eq!(
            backend.list_models(&ch).await.unwrap(),
            vec!["gpt-4o", "text-embedding-3-small"]
        );
        assert!(backend.is_healthy(&ch).await);
        let caps = backend.list_models_with_capabilities(&ch).await.unwrap();
        assert!(caps[0].vision);
        assert!(caps[1].embedding);
    }

    #[tokio::test]
    async fn test_missing_key_rejected_before_network() {
        let server = MockServer::start().await;
        let mut ch = channel(&server);
        ch.api_key.clear();
        let result = OpenAiBackend::new().list_models(&ch).await;
        assert!(matches!(result, Err(SwitchboardError::Config(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_image_turn_uses_data_uri() {
        let turn = ConversationTurn::user("what is this")
            .with_attachment(Attachment::new("image/png", vec![1, 2, 3]));
        let msg = turn_to_message(&turn);
        assert_eq!(msg["content"][0]["text"], "what is this");
        assert_eq!(
            msg["content"][1]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );
    }
}
