use std::io::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gf_agents::{ExecutionOptions, ExecutionOrchestrator, ExecutionOutcome, PhaseReport};
use gf_core::store::Store;
use gf_core::types::{PhaseType, TerminalEntryType};
use gf_persistence::spawn_autosave;
use tracing::info;

use super::Context;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Task id; the active task when `None`.
    pub task: Option<String>,
    pub phase: Option<PhaseType>,
    pub auto_advance: bool,
    /// Stream from the native Ollama API instead of the gateway.
    pub direct: bool,
}

/// Prints terminal entries as they are appended to the store.
#[derive(Default)]
struct TerminalPrinter {
    seen: AtomicUsize,
}

impl TerminalPrinter {
    fn drain(&self, store: &Store) {
        let start = self.seen.load(Ordering::SeqCst);
        let fresh = store.read(|s| s.terminal_entries.iter().skip(start).cloned().collect::<Vec<_>>());
        if fresh.is_empty() {
            return;
        }
        self.seen.fetch_add(fresh.len(), Ordering::SeqCst);
        let mut stdout = std::io::stdout().lock();
        for entry in fresh {
            let _ = match entry.entry_type {
                TerminalEntryType::Boundary => writeln!(stdout, "\n== {} ==", entry.content),
                TerminalEntryType::Error => writeln!(stdout, "\n[error] {}", entry.content),
                _ => write!(stdout, "{}", entry.content),
            };
        }
        let _ = stdout.flush();
    }
}

fn describe(report: &PhaseReport) -> String {
    match &report.outcome {
        ExecutionOutcome::Completed {
            proposal_id: Some(id),
        } => format!("{}: completed, proposal {id} awaits review", report.phase),
        ExecutionOutcome::Completed { proposal_id: None } => {
            format!("{}: completed", report.phase)
        }
        ExecutionOutcome::Failed { error } => format!("{}: failed: {error}", report.phase),
        ExecutionOutcome::Cancelled => format!("{}: cancelled", report.phase),
    }
}

/// Run the `run` subcommand: execute a phase (and optionally the ones after
/// it), streaming output to stdout. Ctrl-C cancels the running phase.
pub async fn run(ctx: &Context, opts: RunOptions) -> anyhow::Result<()> {
    let task_id = match opts.task {
        Some(id) => id,
        None => ctx
            .store
            .read(|s| s.active_task().map(|t| t.id.clone()))
            .ok_or_else(|| anyhow::anyhow!("No task given and no active task selected."))?,
    };

    let mut options = ExecutionOptions::from(&ctx.config.execution);
    options.auto_advance |= opts.auto_advance;
    let orchestrator = Arc::new(
        ExecutionOrchestrator::new(Arc::clone(&ctx.store), ctx.provider(opts.direct))
            .with_options(options),
    );

    let autosave = spawn_autosave(
        Arc::clone(&ctx.store),
        Arc::clone(&ctx.bridge),
        Duration::from_millis(ctx.config.persistence.debounce_ms),
    );

    let printer = Arc::new(TerminalPrinter::default());
    printer
        .seen
        .store(ctx.store.read(|s| s.terminal_entries.len()), Ordering::SeqCst);
    let printing = {
        let printer = Arc::clone(&printer);
        let store = Arc::clone(&ctx.store);
        let events = store.subscribe();
        tokio::spawn(async move {
            while events.recv_async().await.is_ok() {
                printer.drain(&store);
            }
        })
    };

    let canceller = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && orchestrator.cancel() {
                info!("cancel requested from terminal");
            }
        })
    };

    let result = orchestrator.run(&task_id, opts.phase).await;

    canceller.abort();
    printing.abort();
    let _ = printing.await;
    printer.drain(&ctx.store);
    println!();
    autosave.shutdown().await;

    let reports = result?;
    for report in &reports {
        println!("{}", describe(report));
    }
    ctx.persist().await;
    if reports
        .last()
        .is_some_and(|r| matches!(r.outcome, ExecutionOutcome::Failed { .. }))
    {
        anyhow::bail!("phase execution failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: ExecutionOutcome) -> PhaseReport {
        PhaseReport {
            task_id: "task-1".into(),
            phase: PhaseType::Code,
            agent_id: "agent-coder".into(),
            outcome,
            output: String::new(),
        }
    }

    #[test]
    fn outcomes_are_described() {
        assert_eq!(
            describe(&report(ExecutionOutcome::Completed {
                proposal_id: Some("fileops-1".into())
            })),
            "code: completed, proposal fileops-1 awaits review"
        );
        assert_eq!(
            describe(&report(ExecutionOutcome::Failed {
                error: "boom".into()
            })),
            "code: failed: boom"
        );
        assert_eq!(describe(&report(ExecutionOutcome::Cancelled)), "code: cancelled");
    }
}
