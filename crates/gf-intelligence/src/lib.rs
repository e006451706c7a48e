pub mod mock;
pub mod ollama;
pub mod provider;
pub mod stream;

// Re-export the types most callers need.
pub use mock::{MockProvider, MockStep};
pub use ollama::OllamaProvider;
pub use provider::{GatewayProvider, ModelProvider, ProviderRegistry, RunPayload};
pub use stream::{
    ChatMessage, ChatMetadata, ChatPayload, ChatRole, HealthReport, ModelInfo, StreamClient,
    StreamError, TokenChunk, TokenStream,
};
