mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gf_core::settings::ProviderId;
use gf_core::types::PhaseType;

use commands::run::RunOptions;
use commands::Context;

/// GhostFlow CLI -- drive tasks through spec, plan, code, qa and review
/// phases with model-backed agents.
#[derive(Parser)]
#[command(name = "gf", version, about)]
struct Cli {
    /// Config file (defaults to ~/.ghostflow/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn parse_phase(raw: &str) -> Result<PhaseType, String> {
    raw.parse()
}

fn parse_provider(raw: &str) -> Result<ProviderId, String> {
    raw.parse()
}

#[derive(Subcommand)]
enum Commands {
    /// Show projects, tasks, agents and pending proposals (default).
    Status,

    /// Probe the model gateway and record provider availability.
    Health,

    /// List the models of a provider and make it active.
    Models {
        /// `ollama` or `openrouter`; the active provider when omitted.
        #[arg(value_parser = parse_provider)]
        provider: Option<ProviderId>,
    },

    /// Add a project and make it active.
    ProjectAdd {
        name: String,
        /// Repository root on disk.
        #[arg(long)]
        path: Option<String>,
    },

    /// Add a task to the active project and select it.
    TaskAdd {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Execute a phase of a task. Ctrl-C cancels.
    Run {
        /// Task id; the active task when omitted.
        task: Option<String>,
        /// Phase to run; the task's current phase when omitted.
        #[arg(long, value_parser = parse_phase)]
        phase: Option<PhaseType>,
        /// Continue into the following phases until an approval gate.
        #[arg(long)]
        auto_advance: bool,
        /// Stream from the native Ollama API instead of the gateway.
        #[arg(long)]
        direct: bool,
    },

    /// List file-operation proposals.
    Proposals,

    /// Reject a pending file-operation proposal.
    Reject {
        proposal: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ctx = Context::bootstrap(cli.config.as_deref()).await?;

    match cli.command {
        None | Some(Commands::Status) => commands::status::run(&ctx)?,
        Some(Commands::Health) => commands::health::run(&ctx).await?,
        Some(Commands::Models { provider }) => commands::models::run(&ctx, provider).await?,
        Some(Commands::ProjectAdd { name, path }) => {
            commands::project::add_project(&ctx, &name, path).await?
        }
        Some(Commands::TaskAdd { title, description }) => {
            commands::project::add_task(&ctx, &title, description).await?
        }
        Some(Commands::Run {
            task,
            phase,
            auto_advance,
            direct,
        }) => {
            commands::run::run(
                &ctx,
                RunOptions {
                    task,
                    phase,
                    auto_advance,
                    direct,
                },
            )
            .await?
        }
        Some(Commands::Proposals) => commands::proposals::list(&ctx)?,
        Some(Commands::Reject { proposal }) => commands::proposals::reject(&ctx, &proposal).await?,
    }

    Ok(())
}
