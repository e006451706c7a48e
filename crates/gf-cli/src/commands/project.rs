use gf_core::action::Action;
use gf_core::types::{Project, Task};

use super::Context;

/// Run the `project-add` subcommand. The new project becomes active.
pub async fn add_project(ctx: &Context, name: &str, path: Option<String>) -> anyhow::Result<()> {
    let mut project = Project::new(name, path);
    if let Some(repo) = project.repo_path() {
        project.has_git = Some(std::path::Path::new(repo).join(".git").exists());
    }
    let id = project.id.clone();
    ctx.store.dispatch(Action::AddProject(project));
    println!("Added project {id} ({name})");
    ctx.persist().await;
    Ok(())
}

/// Run the `task-add` subcommand: create a task in the active project and
/// select it.
pub async fn add_task(ctx: &Context, title: &str, description: Option<String>) -> anyhow::Result<()> {
    let Some(project_id) = ctx.store.read(|s| s.active_project().map(|p| p.id.clone())) else {
        anyhow::bail!("No active project. Add one with `gf project-add <name> --path <repo>`.");
    };
    let mut task = Task::new(title, project_id);
    if let Some(description) = description {
        task = task.with_description(description);
    }
    let id = task.id.clone();
    ctx.store.dispatch(Action::AddTask(task));
    ctx.store.dispatch(Action::SetActiveTask(Some(id.clone())));
    println!("Added task {id}");
    ctx.persist().await;
    Ok(())
}
