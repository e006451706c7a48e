//! Mirror provider reachability and model catalogs into the store.

use gf_core::action::Action;
use gf_core::settings::ProviderId;
use gf_core::store::Store;
use gf_intelligence::{HealthReport, ModelProvider, ProviderRegistry};
use tracing::{info, warn};

/// Probe every provider and record the result as connection flags.
pub async fn sync_connection(store: &Store, registry: &ProviderRegistry) -> HealthReport {
    let report = registry.health().await;
    for provider in [ProviderId::Ollama, ProviderId::OpenRouter] {
        store.dispatch(Action::SetProviderConnection {
            provider,
            connected: report.is_available(provider),
        });
    }
    if !report.ok {
        warn!("model gateway unreachable");
    }
    info!(
        ollama = report.ollama,
        openrouter = report.openrouter,
        "provider health synced"
    );
    report
}

/// Fetch the model catalog of `provider` and store it. An empty listing
/// leaves the stored catalog untouched.
pub async fn sync_models(store: &Store, provider: &dyn ModelProvider) -> Vec<String> {
    let models: Vec<String> = provider
        .list_models()
        .await
        .into_iter()
        .map(|m| m.id)
        .collect();
    if models.is_empty() {
        warn!(provider = %provider.id(), "no models reported");
    } else {
        info!(provider = %provider.id(), count = models.len(), "models synced");
        store.dispatch(Action::SetAvailableModels(models.clone()));
    }
    models
}

/// Switch the active provider in both the store and the registry. A run that
/// is already streaming keeps its original provider.
pub fn select_provider(store: &Store, registry: &ProviderRegistry, id: ProviderId) {
    registry.set_active(id);
    store.dispatch(Action::SetActiveProvider(id));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
