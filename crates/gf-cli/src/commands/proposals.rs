use gf_agents::reject_proposal;

use super::Context;

/// Run the `proposals` subcommand: list every proposal with its ops.
pub fn list(ctx: &Context) -> anyhow::Result<()> {
    let proposals = ctx.store.read(|s| s.file_op_proposals.clone());
    if proposals.is_empty() {
        println!("No proposals.");
        return Ok(());
    }
    for proposal in proposals {
        println!(
            "{}  {:?}  task={}  repo={}",
            proposal.id,
            proposal.status,
            proposal.task_id.as_deref().unwrap_or("-"),
            proposal.repo_path.as_deref().unwrap_or("-"),
        );
        for op in &proposal.ops {
            println!("    {:?} {}", op.op_type, op.path);
        }
        if let Some(error) = &proposal.error {
            println!("    error: {error}");
        }
    }
    Ok(())
}

/// Run the `reject` subcommand.
pub async fn reject(ctx: &Context, id: &str) -> anyhow::Result<()> {
    reject_proposal(&ctx.store, id)?;
    println!("Rejected {id}");
    ctx.persist().await;
    Ok(())
}
