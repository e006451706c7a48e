use gf_agents::provider_sync::sync_connection;

use super::Context;

/// Run the `health` subcommand: probe the gateway and record per-provider
/// availability.
pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let registry = ctx.registry();
    let report = sync_connection(&ctx.store, &registry).await;

    let label = |up: bool| if up { "available" } else { "unavailable" };
    println!("Gateway:     {}", ctx.config.llm.base_url);
    println!("  reachable: {}", if report.ok { "yes" } else { "no" });
    println!("  ollama:     {}", label(report.ollama));
    println!("  openrouter: {}", label(report.openrouter));
    ctx.persist().await;
    Ok(())
}
