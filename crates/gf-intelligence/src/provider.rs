//! Provider abstraction.
//!
//! Every backend is a [`ModelProvider`]. The [`ProviderRegistry`] holds one
//! provider per [`ProviderId`] plus the globally active selection, and is
//! itself a `ModelProvider` that routes each call to whichever provider is
//! active at call time.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use gf_core::settings::ProviderId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::stream::{
    ChatMessage, ChatMetadata, ChatPayload, HealthReport, ModelInfo, StreamClient, StreamError,
    TokenStream,
};

// ---------------------------------------------------------------------------
// RunPayload
// ---------------------------------------------------------------------------

/// A provider-agnostic chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChatMetadata>,
}

impl RunPayload {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            metadata: None,
        }
    }

    pub fn into_chat(self, provider: ProviderId) -> ChatPayload {
        ChatPayload {
            provider,
            model: self.model,
            messages: self.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            metadata: self.metadata,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelProvider trait
// ---------------------------------------------------------------------------

/// Unified interface over streaming chat backends.
///
/// `is_available` and `list_models` never fail; problems degrade to `false`
/// and an empty list. `run` is lazy: nothing is sent until the returned
/// stream is polled.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn name(&self) -> &str;

    async fn is_available(&self) -> bool;

    async fn list_models(&self) -> Vec<ModelInfo>;

    fn run(&self, payload: RunPayload) -> TokenStream;

    /// Abort the stream most recently returned by `run`.
    fn cancel(&self);
}

// ---------------------------------------------------------------------------
// GatewayProvider
// ---------------------------------------------------------------------------

/// A provider reached through the shared LLM gateway.
pub struct GatewayProvider {
    client: Arc<StreamClient>,
    provider: ProviderId,
}

impl GatewayProvider {
    pub fn new(client: Arc<StreamClient>, provider: ProviderId) -> Self {
        Self { client, provider }
    }
}

#[async_trait]
impl ModelProvider for GatewayProvider {
    fn id(&self) -> ProviderId {
        self.provider
    }

    fn name(&self) -> &str {
        match self.provider {
            ProviderId::Ollama => "Ollama (gateway)",
            ProviderId::OpenRouter => "OpenRouter (gateway)",
        }
    }

    async fn is_available(&self) -> bool {
        self.client.check_health().await.is_available(self.provider)
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        self.client.list_models(self.provider).await
    }

    fn run(&self, payload: RunPayload) -> TokenStream {
        self.client.stream_chat(&payload.into_chat(self.provider))
    }

    fn cancel(&self) {
        self.client.cancel();
    }
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

/// Registered providers plus the active selection.
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, Arc<dyn ModelProvider>>,
    active: RwLock<ProviderId>,
    gateway: Option<Arc<StreamClient>>,
}

impl ProviderRegistry {
    /// An empty registry with `active` selected.
    pub fn new(active: ProviderId) -> Self {
        Self {
            providers: BTreeMap::new(),
            active: RwLock::new(active),
            gateway: None,
        }
    }

    /// Both providers routed through one gateway client.
    pub fn gateway(client: Arc<StreamClient>, active: ProviderId) -> Self {
        let mut registry = Self::new(active);
        for id in [ProviderId::Ollama, ProviderId::OpenRouter] {
            registry.register(Arc::new(GatewayProvider::new(Arc::clone(&client), id)));
        }
        registry.gateway = Some(client);
        registry
    }

    /// Register `provider` under its own id, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn ModelProvider>> {
        self.providers.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }

    pub fn active(&self) -> ProviderId {
        *self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch the active provider. Streams already running are unaffected.
    pub fn set_active(&self, id: ProviderId) {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if *active != id {
            info!(from = %*active, to = %id, "switching active provider");
            *active = id;
        }
    }

    /// Gateway health in one round trip, when a gateway is configured.
    /// Otherwise each registered provider is probed individually.
    pub async fn health(&self) -> HealthReport {
        if let Some(client) = &self.gateway {
            return client.check_health().await;
        }
        let mut report = HealthReport::unavailable();
        for (id, provider) in &self.providers {
            let up = provider.is_available().await;
            match id {
                ProviderId::Ollama => report.ollama = up,
                ProviderId::OpenRouter => report.openrouter = up,
            }
        }
        report.ok = report.ollama || report.openrouter;
        report
    }

    fn current(&self) -> Option<Arc<dyn ModelProvider>> {
        self.get(self.active())
    }
}

#[async_trait]
impl ModelProvider for ProviderRegistry {
    fn id(&self) -> ProviderId {
        self.active()
    }

    fn name(&self) -> &str {
        "registry"
    }

    async fn is_available(&self) -> bool {
        match self.current() {
            Some(provider) => provider.is_available().await,
            None => false,
        }
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        match self.current() {
            Some(provider) => provider.list_models().await,
            None => Vec::new(),
        }
    }

    fn run(&self, payload: RunPayload) -> TokenStream {
        match self.current() {
            Some(provider) => provider.run(payload),
            None => {
                let message = format!("no provider registered for {}", self.active());
                Box::pin(futures_util::stream::once(async move {
                    Err(StreamError::Unsupported(message))
                }))
            }
        }
    }

    fn cancel(&self) {
        for provider in self.providers.values() {
            provider.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use futures_util::StreamExt;

    #[test]
    fn run_payload_keeps_fields() {
        let mut payload = RunPayload::new("m", vec![ChatMessage::user("hi")]);
        payload.temperature = Some(0.2);
        let chat = payload.into_chat(ProviderId::OpenRouter);
        assert_eq!(chat.provider, ProviderId::OpenRouter);
        assert_eq!(chat.model, "m");
        assert_eq!(chat.temperature, Some(0.2));
    }

    #[tokio::test]
    async fn registry_routes_to_active() {
        let ollama = Arc::new(MockProvider::new(ProviderId::Ollama).with_chunks(["from ollama"]));
        let router =
            Arc::new(MockProvider::new(ProviderId::OpenRouter).with_chunks(["from openrouter"]));
        let registry = ProviderRegistry::new(ProviderId::Ollama)
            .with_provider(ollama.clone())
            .with_provider(router.clone());

        registry.set_active(ProviderId::OpenRouter);
        let chunks: Vec<_> = registry.run(RunPayload::new("m", vec![])).collect().await;
        assert_eq!(chunks[0].as_ref().unwrap().content, "from openrouter");
        assert_eq!(router.captured_payloads().len(), 1);
        assert!(ollama.captured_payloads().is_empty());
    }

    #[tokio::test]
    async fn switching_does_not_touch_running_stream() {
        let ollama = Arc::new(MockProvider::new(ProviderId::Ollama).with_chunks(["a", "b"]));
        let registry = ProviderRegistry::new(ProviderId::Ollama).with_provider(ollama);
        let mut stream = registry.run(RunPayload::new("m", vec![]));
        registry.set_active(ProviderId::OpenRouter);
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!((first.content.as_str(), second.content.as_str()), ("a", "b"));
    }

    #[tokio::test]
    async fn missing_provider_yields_error() {
        let registry = ProviderRegistry::new(ProviderId::OpenRouter);
        let items: Vec<_> = registry.run(RunPayload::new("m", vec![])).collect().await;
        assert!(matches!(items[0], Err(StreamError::Unsupported(_))));
        assert!(!registry.is_available().await);
        assert!(registry.list_models().await.is_empty());
    }

    #[tokio::test]
    async fn health_without_gateway_probes_each() {
        let registry = ProviderRegistry::new(ProviderId::Ollama)
            .with_provider(Arc::new(MockProvider::new(ProviderId::Ollama)))
            .with_provider(Arc::new(
                MockProvider::new(ProviderId::OpenRouter).with_availability(false),
            ));
        let report = registry.health().await;
        assert!(report.ok && report.ollama && !report.openrouter);
    }
}
