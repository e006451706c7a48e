use gf_agents::provider_sync::{select_provider, sync_models};
use gf_core::settings::ProviderId;

use super::Context;

/// Run the `models` subcommand: list and store the models of `provider`
/// (the active one when omitted), making it the active provider.
pub async fn run(ctx: &Context, provider: Option<ProviderId>) -> anyhow::Result<()> {
    let registry = ctx.registry();
    if let Some(id) = provider {
        select_provider(&ctx.store, &registry, id);
    }
    let active = registry.active();
    let models = sync_models(&ctx.store, &registry).await;

    if models.is_empty() {
        println!("No models reported by {active}.");
    } else {
        println!("Models ({active}):");
        for model in &models {
            println!("  {model}");
        }
    }
    ctx.persist().await;
    Ok(())
}
