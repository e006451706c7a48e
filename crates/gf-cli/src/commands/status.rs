use std::fmt::Write as _;

use gf_core::registry::{RegistryAgent, RuntimeStatus};
use gf_core::state::AppState;
use gf_core::types::{PhaseStatus, ProposalStatus};

use super::Context;

/// Run the `status` subcommand: print projects, tasks, agents and proposals.
pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let state = ctx.store.snapshot();
    let registry = ctx.store.registry();
    print!("{}", render(&state, &registry));
    Ok(())
}

fn phase_marker(status: PhaseStatus) -> &'static str {
    match status {
        PhaseStatus::Pending => " ",
        PhaseStatus::Active => ">",
        PhaseStatus::Completed => "x",
        PhaseStatus::Failed => "!",
        PhaseStatus::Skipped => "-",
    }
}

fn runtime_label(status: RuntimeStatus) -> &'static str {
    match status {
        RuntimeStatus::Idle => "idle",
        RuntimeStatus::Running => "running",
        RuntimeStatus::Done => "done",
        RuntimeStatus::Error => "error",
    }
}

pub fn render(state: &AppState, registry: &[RegistryAgent]) -> String {
    let mut out = String::new();
    let active_project = state.ui.active_project_id.as_deref();
    let active_task = state.ui.active_task_id.as_deref();

    let _ = writeln!(out, "GhostFlow status");
    let _ = writeln!(out, "{}", "-".repeat(40));

    let _ = writeln!(out, "Projects ({}):", state.projects.len());
    for project in &state.projects {
        let marker = if Some(project.id.as_str()) == active_project { "*" } else { " " };
        let repo = project.repo_path().unwrap_or("(no repository)");
        let _ = writeln!(out, " {marker} {}  {}  {repo}", project.id, project.name);
    }

    let _ = writeln!(out, "Tasks ({}):", state.tasks.len());
    for task in &state.tasks {
        let marker = if Some(task.id.as_str()) == active_task { "*" } else { " " };
        let phases: String = task
            .phases
            .iter()
            .map(|p| format!("[{}]{}", phase_marker(p.status), p.id))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(
            out,
            " {marker} {}  {}  {:?}  current={}  {phases}",
            task.id, task.title, task.status, task.current_phase
        );
    }

    let _ = writeln!(out, "Agents ({}):", registry.len());
    for entry in registry {
        let phases: Vec<&str> = entry.phase_types.iter().map(|p| p.as_str()).collect();
        let placeholder = if entry.is_placeholder { " (unregistered)" } else { "" };
        let _ = writeln!(
            out,
            "   {:<16} {:<8} model={}  phases={}{placeholder}",
            entry.agent.name,
            runtime_label(entry.runtime_status),
            entry.agent.model,
            phases.join(",")
        );
    }

    let pending: Vec<_> = state
        .file_op_proposals
        .iter()
        .filter(|p| p.status == ProposalStatus::Pending)
        .collect();
    let _ = writeln!(out, "Pending proposals ({}):", pending.len());
    for proposal in pending {
        let _ = writeln!(out, "   {}  {} op(s)", proposal.id, proposal.ops.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::action::{Action, PhasePatch};
    use gf_core::store::Store;
    use gf_core::types::{PhaseType, Project, Task};

    #[test]
    fn render_marks_active_selection_and_phase_state() {
        let store = Store::default();
        let project = Project::new("demo", Some("/work/demo".into()));
        store.dispatch(Action::AddProject(project.clone()));
        let task = Task::new("Add login", &project.id);
        let task_id = task.id.clone();
        store.dispatch(Action::AddTask(task));
        store.dispatch(Action::SetActiveTask(Some(task_id.clone())));
        store.dispatch(Action::UpdatePhase {
            task_id: task_id.clone(),
            phase: PhaseType::Spec,
            patch: PhasePatch::start(chrono::Utc::now()),
            at: chrono::Utc::now(),
        });

        let text = render(&store.snapshot(), &store.registry());
        assert!(text.contains(&format!(" * {}  demo  /work/demo", project.id)));
        assert!(text.contains(&format!(" * {task_id}  Add login")));
        assert!(text.contains("[>]spec [ ]plan"));
        assert!(text.contains("Spec Writer"));
        assert!(text.contains("running"));
        assert!(text.contains("Pending proposals (0):"));
    }
}
