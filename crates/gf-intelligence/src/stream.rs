//! Token stream client for the LLM gateway.
//!
//! The gateway exposes `GET /health`, `GET /models?provider=…` and a
//! `POST /chat` endpoint answering with Server-Sent Events:
//!
//! ```text
//! event: token
//! data: {"content":"Hel","done":false}
//!
//! event: end
//! data: {}
//! ```
//!
//! Events are only parsed once a full `\n\n`-terminated block has been
//! buffered, so fragmented network reads are harmless. A stream that closes
//! without a terminal marker is an error, never a silent success.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use gf_core::config::LlmConfig;
use gf_core::settings::ProviderId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lazily-driven sequence of token chunks.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<TokenChunk, StreamError>> + Send>>;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// Connection failure, DNS, TLS, or a read error mid-stream.
    #[error("transport error: {0}")]
    Http(String),

    /// The gateway answered with a non-success status.
    #[error("gateway returned {status}")]
    Status { status: u16, body: String },

    /// The remote side sent an explicit error event. The message is kept
    /// verbatim.
    #[error("{0}")]
    Remote(String),

    /// The response body could not be decoded.
    #[error("malformed stream: {0}")]
    Decode(String),

    /// The stream closed before a terminal marker arrived.
    #[error("stream ended without a completion marker")]
    UnexpectedEof,

    #[error("request timed out")]
    Timeout,

    /// The provider cannot serve the request (e.g. missing credentials).
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Timeout
        } else {
            StreamError::Http(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Free-form context forwarded to the gateway with each chat request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_git: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub provider: ProviderId,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChatMetadata>,
}

/// One unit of streamed output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TokenChunk {
    pub content: String,
    pub done: bool,
}

impl TokenChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
        }
    }

    /// Terminal marker with no content.
    pub fn done() -> Self {
        Self {
            content: String::new(),
            done: true,
        }
    }
}

/// Data payload of a token event. Some gateways send `token` instead of
/// `content`.
#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
}

impl ModelInfo {
    /// Identifier to store in settings: the id, or the name when the id is blank.
    pub fn label(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Per-provider availability as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub ollama: bool,
    pub openrouter: bool,
}

impl HealthReport {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self, provider: ProviderId) -> bool {
        match provider {
            ProviderId::Ollama => self.ollama,
            ProviderId::OpenRouter => self.openrouter,
        }
    }

    /// Normalize the gateway's health body. Two shapes are in the wild:
    /// `{"ok":true,"ollama":{"ok":true}}` and
    /// `{"providers":{"ollama":{"available":true},…}}`.
    pub fn from_value(data: &serde_json::Value) -> Self {
        let top_ok = data.get("ok").and_then(|v| v.as_bool());
        let ollama_flag = data
            .get("ollama")
            .and_then(|o| o.get("ok"))
            .and_then(|v| v.as_bool());
        let provider_available = |name: &str| {
            data.get("providers")
                .and_then(|p| p.get(name))
                .and_then(|p| p.get("available"))
                .and_then(|v| v.as_bool())
                == Some(true)
        };
        Self {
            ok: top_ok != Some(false),
            ollama: (top_ok == Some(true) && ollama_flag != Some(false))
                || provider_available("ollama"),
            openrouter: provider_available("openrouter"),
        }
    }
}

// ---------------------------------------------------------------------------
// SSE decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Token(TokenChunk),
    End,
    Error(String),
}

/// Parse one complete SSE block (the text between blank lines).
pub fn parse_sse_event(block: &str) -> Option<SseEvent> {
    let mut event_type = "";
    let mut data_lines: Vec<&str> = Vec::new();
    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_type = rest.trim();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim());
        }
    }
    let data = data_lines.join("\n");

    match event_type {
        "error" => {
            let message = serde_json::from_str::<serde_json::Value>(&data)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_else(|| data.clone());
            return Some(SseEvent::Error(message));
        }
        "end" => return Some(SseEvent::End),
        _ => {}
    }

    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::End);
    }
    match serde_json::from_str::<WireChunk>(&data) {
        Ok(wire) => {
            let content = wire
                .content
                .filter(|c| !c.is_empty())
                .or(wire.token)
                .unwrap_or_default();
            Some(SseEvent::Token(TokenChunk {
                content,
                done: wire.done,
            }))
        }
        Err(_) => Some(SseEvent::Token(TokenChunk::text(data))),
    }
}

/// Incremental SSE decoder. Bytes go in, complete events come out.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&block[..pos]);
            if let Some(event) = parse_sse_event(&text) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            None
        } else {
            parse_sse_event(&text)
        }
    }
}

// ---------------------------------------------------------------------------
// Response driving
// ---------------------------------------------------------------------------

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send>>;

/// Line- or event-oriented body decoder used by [`drive_response`].
pub(crate) trait ChunkDecoder: Send + 'static {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<TokenChunk, StreamError>>;
    fn finish(&mut self) -> Vec<Result<TokenChunk, StreamError>>;
}

impl ChunkDecoder for SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<TokenChunk, StreamError>> {
        SseDecoder::push(self, bytes).into_iter().map(event_to_item).collect()
    }

    fn finish(&mut self) -> Vec<Result<TokenChunk, StreamError>> {
        SseDecoder::finish(self).into_iter().map(event_to_item).collect()
    }
}

fn event_to_item(event: SseEvent) -> Result<TokenChunk, StreamError> {
    match event {
        SseEvent::Token(chunk) => Ok(chunk),
        SseEvent::End => Ok(TokenChunk::done()),
        SseEvent::Error(message) => Err(StreamError::Remote(message)),
    }
}

enum Stage {
    Connecting(reqwest::RequestBuilder),
    Reading(ByteStream),
    Finished,
}

struct DriveState<D> {
    stage: Stage,
    decoder: D,
    pending: VecDeque<Result<TokenChunk, StreamError>>,
    cancel: CancellationToken,
}

/// Send `request` and turn its body into a [`TokenStream`].
///
/// The stream ends after the first `done` chunk or error. Cancelling
/// `cancel` ends it quietly at the next suspension point. A body that ends
/// without a terminal marker yields [`StreamError::UnexpectedEof`].
pub(crate) fn drive_response<D: ChunkDecoder>(
    request: reqwest::RequestBuilder,
    decoder: D,
    cancel: CancellationToken,
) -> TokenStream {
    let state = DriveState {
        stage: Stage::Connecting(request),
        decoder,
        pending: VecDeque::new(),
        cancel,
    };

    let stream = futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if state.cancel.is_cancelled() {
                return None;
            }

            if let Some(item) = state.pending.pop_front() {
                let terminal = match &item {
                    Ok(chunk) => chunk.done,
                    Err(_) => true,
                };
                if terminal {
                    state.pending.clear();
                    state.stage = Stage::Finished;
                }
                return Some((item, state));
            }

            match std::mem::replace(&mut state.stage, Stage::Finished) {
                Stage::Finished => return None,
                Stage::Connecting(request) => {
                    let response = tokio::select! {
                        biased;
                        _ = state.cancel.cancelled() => return None,
                        res = request.send() => res,
                    };
                    match response {
                        Err(e) => state.pending.push_back(Err(e.into())),
                        Ok(resp) if !resp.status().is_success() => {
                            let status = resp.status().as_u16();
                            let body = resp.text().await.unwrap_or_default();
                            warn!(status, "stream request rejected");
                            state
                                .pending
                                .push_back(Err(StreamError::Status { status, body }));
                        }
                        Ok(resp) => {
                            debug!(status = resp.status().as_u16(), "stream opened");
                            let body = resp.bytes_stream().map(|r| r.map(|b| b.to_vec()));
                            state.stage = Stage::Reading(Box::pin(body));
                        }
                    }
                }
                Stage::Reading(mut body) => {
                    let next = tokio::select! {
                        biased;
                        _ = state.cancel.cancelled() => return None,
                        next = body.next() => next,
                    };
                    match next {
                        Some(Ok(bytes)) => {
                            state.pending.extend(state.decoder.push(&bytes));
                            state.stage = Stage::Reading(body);
                        }
                        Some(Err(e)) => {
                            state.pending.push_back(Err(e.into()));
                        }
                        None => {
                            state.pending.extend(state.decoder.finish());
                            let terminated = state
                                .pending
                                .iter()
                                .any(|item| item.as_ref().map(|c| c.done).unwrap_or(true));
                            if !terminated {
                                state.pending.push_back(Err(StreamError::UnexpectedEof));
                            }
                        }
                    }
                }
            }
        }
    });

    Box::pin(stream)
}

// ---------------------------------------------------------------------------
// StreamClient
// ---------------------------------------------------------------------------

/// Client for the LLM gateway.
///
/// At most one stream is tracked at a time; [`StreamClient::cancel`] aborts
/// whichever stream was opened last.
pub struct StreamClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    health_timeout: Duration,
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl StreamClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeouts(base_url, Duration::from_secs(300), Duration::from_secs(5))
    }

    /// `request_timeout` bounds connecting and each idle gap between body
    /// chunks, never the whole stream. Whole-phase limits belong to the
    /// orchestrator.
    pub fn with_timeouts(
        base_url: impl Into<String>,
        request_timeout: Duration,
        health_timeout: Duration,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(request_timeout)
                .read_timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
            health_timeout,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::with_timeouts(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.health_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `/health`. Any failure reports every provider as unavailable.
    pub async fn check_health(&self) -> HealthReport {
        let url = format!("{}/health", self.base_url);
        let resp = match self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(status = resp.status().as_u16(), "health check returned non-success");
                return HealthReport::unavailable();
            }
            Err(e) => {
                debug!(error = %e, "gateway unreachable");
                return HealthReport::unavailable();
            }
        };
        match resp.json::<serde_json::Value>().await {
            Ok(data) => HealthReport::from_value(&data),
            Err(e) => {
                debug!(error = %e, "health body unreadable");
                HealthReport::unavailable()
            }
        }
    }

    /// List models for `provider`. Any failure yields an empty list.
    pub async fn list_models(&self, provider: ProviderId) -> Vec<ModelInfo> {
        let url = format!("{}/models", self.base_url);
        let resp = match self
            .client
            .get(&url)
            .query(&[("provider", provider.as_str())])
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!(%provider, status = resp.status().as_u16(), "model listing failed");
                return Vec::new();
            }
            Err(e) => {
                warn!(%provider, error = %e, "model listing failed");
                return Vec::new();
            }
        };
        match resp.json::<ModelsResponse>().await {
            Ok(body) => body
                .models
                .into_iter()
                .map(|mut m| {
                    m.provider.get_or_insert(provider);
                    m
                })
                .collect(),
            Err(e) => {
                warn!(%provider, error = %e, "model listing unreadable");
                Vec::new()
            }
        }
    }

    /// Open a chat stream. Nothing is sent until the stream is first polled.
    pub fn stream_chat(&self, payload: &ChatPayload) -> TokenStream {
        let cancel = self.begin();
        let url = format!("{}/chat", self.base_url);
        debug!(provider = %payload.provider, model = %payload.model, "opening chat stream");
        let request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(payload);
        drive_response(request, SseDecoder::new(), cancel)
    }

    /// Abort the most recently opened stream, if any.
    pub fn cancel(&self) {
        let token = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            debug!("cancelling chat stream");
            token.cancel();
        }
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        token
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_event() {
        let ev = parse_sse_event("event: token\ndata: {\"content\":\"Hi\",\"done\":false}");
        assert_eq!(ev, Some(SseEvent::Token(TokenChunk::text("Hi"))));
    }

    #[test]
    fn token_field_is_normalized() {
        let ev = parse_sse_event("data: {\"token\":\"abc\"}");
        assert_eq!(ev, Some(SseEvent::Token(TokenChunk::text("abc"))));
    }

    #[test]
    fn end_and_done_markers() {
        assert_eq!(parse_sse_event("event: end\ndata: {}"), Some(SseEvent::End));
        assert_eq!(parse_sse_event("data: [DONE]"), Some(SseEvent::End));
        let ev = parse_sse_event("data: {\"content\":\"\",\"done\":true}");
        assert_eq!(ev, Some(SseEvent::Token(TokenChunk::done())));
    }

    #[test]
    fn error_event_keeps_message() {
        let ev = parse_sse_event("event: error\ndata: {\"message\":\"model not found\"}");
        assert_eq!(ev, Some(SseEvent::Error("model not found".into())));
        let ev = parse_sse_event("event: error\ndata: upstream exploded");
        assert_eq!(ev, Some(SseEvent::Error("upstream exploded".into())));
    }

    #[test]
    fn raw_data_is_content() {
        let ev = parse_sse_event("data: plain words");
        assert_eq!(ev, Some(SseEvent::Token(TokenChunk::text("plain words"))));
        assert_eq!(parse_sse_event(": keep-alive"), None);
    }

    #[test]
    fn decoder_buffers_fragments() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"event: token\ndata: {\"cont").is_empty());
        assert!(dec.push(b"ent\":\"Hel\"}\n").is_empty());
        let events = dec.push(b"\nevent: token\r\ndata: {\"content\":\"lo\"}\r\n\r\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Token(TokenChunk::text("Hel")),
                SseEvent::Token(TokenChunk::text("lo")),
            ]
        );
        assert!(dec.finish().is_none());
    }

    #[test]
    fn decoder_handles_split_utf8() {
        let mut dec = SseDecoder::new();
        let bytes = "data: {\"content\":\"héllo\"}\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(dec.push(&bytes[..split]).is_empty());
        let events = dec.push(&bytes[split..]);
        assert_eq!(events, vec![SseEvent::Token(TokenChunk::text("héllo"))]);
    }

    #[test]
    fn decoder_finish_flushes_tail() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"event: end\ndata: {}").is_empty());
        assert_eq!(dec.finish(), Some(SseEvent::End));
    }

    #[test]
    fn health_shapes() {
        let a = HealthReport::from_value(&serde_json::json!({"ok": true, "ollama": {"ok": true}}));
        assert!(a.ok && a.ollama && !a.openrouter);
        let b = HealthReport::from_value(&serde_json::json!({
            "providers": {"ollama": {"available": false}, "openrouter": {"available": true}}
        }));
        assert!(b.ok && !b.ollama && b.openrouter);
        let c = HealthReport::from_value(&serde_json::json!({"ok": false}));
        assert!(!c.ok && !c.ollama);
    }

    #[test]
    fn payload_wire_shape() {
        let payload = ChatPayload {
            provider: ProviderId::Ollama,
            model: "llama3.2".into(),
            messages: vec![ChatMessage::system("s"), ChatMessage::user("u")],
            temperature: None,
            max_tokens: Some(256),
            metadata: Some(ChatMetadata {
                task_id: Some("task-1".into()),
                ..ChatMetadata::default()
            }),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["provider"], "ollama");
        assert_eq!(json["maxTokens"], 256);
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["metadata"]["taskId"], "task-1");
    }

    #[test]
    fn model_label_falls_back_to_name() {
        let m = ModelInfo {
            id: String::new(),
            name: "qwen".into(),
            context_length: None,
            provider: None,
        };
        assert_eq!(m.label(), "qwen");
    }
}
