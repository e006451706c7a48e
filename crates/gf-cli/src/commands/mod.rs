pub mod health;
pub mod models;
pub mod project;
pub mod proposals;
pub mod run;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use gf_core::config::Config;
use gf_core::state::AppState;
use gf_core::store::Store;
use gf_intelligence::{ModelProvider, OllamaProvider, ProviderRegistry, StreamClient};
use gf_persistence::{hydrate, save_if_idle, PersistenceBridge};
use tracing::warn;

/// Everything a command needs: configuration, the hydrated store and the
/// persistence chain it saves back to.
pub struct Context {
    pub config: Config,
    pub store: Arc<Store>,
    pub bridge: Arc<PersistenceBridge>,
}

impl Context {
    /// Load config, build the store and hydrate it from the first tier that
    /// has a snapshot.
    pub async fn bootstrap(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::load().context("loading config")?,
        };
        gf_telemetry::logging::init_from_config("gf", &config.general);
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let map = config.phase_agent_map()?;
        let store = Arc::new(Store::new(AppState::default(), map));
        let bridge = Arc::new(PersistenceBridge::from_config(&config.persistence).await);
        hydrate(&store, &bridge).await;
        Ok(Self {
            config,
            store,
            bridge,
        })
    }

    /// Save now, unless work is in flight.
    pub async fn persist(&self) {
        if !save_if_idle(&self.store, &self.bridge).await {
            warn!("state not persisted");
        }
    }

    /// Gateway-backed providers, with the active one taken from settings.
    pub fn registry(&self) -> ProviderRegistry {
        let active = self
            .store
            .read(|s| s.settings.execution_engine.active_provider);
        ProviderRegistry::gateway(Arc::new(StreamClient::from_config(&self.config.llm)), active)
    }

    /// The provider executions stream from: the native Ollama API when
    /// `direct` is set, otherwise the gateway registry.
    pub fn provider(&self, direct: bool) -> Arc<dyn ModelProvider> {
        if direct {
            Arc::new(OllamaProvider::new(&self.config.llm.ollama_endpoint))
        } else {
            Arc::new(self.registry())
        }
    }
}
