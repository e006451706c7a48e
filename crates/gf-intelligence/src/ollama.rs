//! Direct Ollama provider speaking the native NDJSON API.
//!
//! `POST /api/chat` with `stream: true` answers one JSON object per line:
//! `{"message":{"role":"assistant","content":"…"},"done":false}`. The last
//! line carries `"done":true`; failures arrive as `{"error":"…"}`.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gf_core::settings::ProviderId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::{ModelProvider, RunPayload};
use crate::stream::{
    drive_response, ChatMessage, ChunkDecoder, ModelInfo, StreamError, TokenChunk, TokenStream,
};

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_NUM_PREDICT: u32 = 2048;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

// ---------------------------------------------------------------------------
// NDJSON decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    fn parse_line(line: &[u8]) -> Option<Result<TokenChunk, StreamError>> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let parsed = match serde_json::from_str::<ChatLine>(text) {
            Ok(line) => line,
            Err(e) => return Some(Err(StreamError::Decode(e.to_string()))),
        };
        if let Some(error) = parsed.error {
            return Some(Err(StreamError::Remote(error)));
        }
        Some(Ok(TokenChunk {
            content: parsed.message.map(|m| m.content).unwrap_or_default(),
            done: parsed.done,
        }))
    }
}

impl ChunkDecoder for NdjsonDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<TokenChunk, StreamError>> {
        self.buffer.extend_from_slice(bytes);
        let mut items = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            items.extend(Self::parse_line(&line));
        }
        items
    }

    fn finish(&mut self) -> Vec<Result<TokenChunk, StreamError>> {
        let rest = std::mem::take(&mut self.buffer);
        Self::parse_line(&rest).into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// OllamaProvider
// ---------------------------------------------------------------------------

pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    active: Mutex<Option<CancellationToken>>,
}

impl OllamaProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            active: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn tags(&self) -> Result<Vec<Tag>, StreamError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(StreamError::Status {
                status,
                body: resp.text().await.unwrap_or_default(),
            });
        }
        let body: TagsResponse = resp
            .json()
            .await
            .map_err(|e| StreamError::Decode(e.to_string()))?;
        Ok(body.models)
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
    }

    fn name(&self) -> &str {
        "Ollama"
    }

    async fn is_available(&self) -> bool {
        match self.tags().await {
            Ok(_) => true,
            Err(e) => {
                debug!(endpoint = %self.endpoint, error = %e, "ollama unavailable");
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        match self.tags().await {
            Ok(tags) => tags
                .into_iter()
                .map(|t| ModelInfo {
                    id: t.name.clone(),
                    name: t.name,
                    context_length: None,
                    provider: Some(ProviderId::Ollama),
                })
                .collect(),
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "ollama model listing failed");
                Vec::new()
            }
        }
    }

    fn run(&self, payload: RunPayload) -> TokenStream {
        let token = CancellationToken::new();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        let body = ChatRequest {
            model: &payload.model,
            messages: &payload.messages,
            stream: true,
            options: ChatOptions {
                temperature: payload.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                num_predict: payload.max_tokens.unwrap_or(DEFAULT_NUM_PREDICT),
            },
        };
        let request = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&body);
        drive_response(request, NdjsonDecoder::default(), token)
    }

    fn cancel(&self) {
        if let Some(token) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_lines_across_reads() {
        let mut dec = NdjsonDecoder::default();
        assert!(dec.push(b"{\"message\":{\"content\":\"He").is_empty());
        let items = dec.push(b"y\"},\"done\":false}\n{\"done\":true}\n");
        assert_eq!(items, vec![Ok(TokenChunk::text("Hey")), Ok(TokenChunk::done())]);
    }

    #[test]
    fn ndjson_error_line() {
        let mut dec = NdjsonDecoder::default();
        let items = dec.push(b"{\"error\":\"model 'x' not found\"}\n");
        assert_eq!(items, vec![Err(StreamError::Remote("model 'x' not found".into()))]);
    }

    #[test]
    fn ndjson_garbage_is_decode_error() {
        let mut dec = NdjsonDecoder::default();
        assert!(dec.push(b"not json").is_empty());
        let items = dec.finish();
        assert!(matches!(items.as_slice(), [Err(StreamError::Decode(_))]));
    }
}
