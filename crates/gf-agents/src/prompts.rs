//! Prompt and payload construction for a phase execution.
//!
//! Templates use `{variable}` placeholders expanded at render time:
//! `{agent_name}`, `{role}`, `{title}`, `{phase}`, `{context}`.

use std::collections::HashMap;

use gf_core::settings::Settings;
use gf_core::types::{Agent, PhaseType, Project, Task};
use gf_intelligence::{ChatMessage, ChatMetadata, RunPayload};

use crate::orchestrator::ExecutionOptions;

pub const SYSTEM_TEMPLATE: &str =
    "You are the {agent_name} agent (role: {role}). Current task: {title}. Current phase: {phase}.";

pub const CONTEXT_TEMPLATE: &str = "Task context: {context}";

pub const USER_TEMPLATE: &str = "Proceed with the {phase} phase. Stream concise updates as tokens.";

/// Expand `{key}` placeholders in `template`.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut output = template.to_string();
    for (key, value) in vars {
        output = output.replace(&format!("{{{key}}}"), value);
    }
    output
}

pub fn system_prompt(agent: &Agent, task: &Task, phase: PhaseType) -> String {
    let mut vars = HashMap::new();
    vars.insert("agent_name", agent.name.clone());
    vars.insert("role", agent.role.as_str().to_string());
    vars.insert("title", task.title.clone());
    vars.insert("phase", phase.display_name().to_string());
    let mut prompt = render(SYSTEM_TEMPLATE, &vars);

    let description = task.description.trim();
    if !description.is_empty() {
        vars.insert("context", description.to_string());
        prompt.push(' ');
        prompt.push_str(&render(CONTEXT_TEMPLATE, &vars));
    }
    prompt
}

pub fn user_prompt(phase: PhaseType) -> String {
    let vars = HashMap::from([("phase", phase.display_name().to_string())]);
    render(USER_TEMPLATE, &vars)
}

/// Model for `agent`: the per-role assignment, then the agent's own model,
/// then `fallback`.
pub fn select_model(settings: &Settings, agent: &Agent, fallback: &str) -> String {
    settings
        .execution_engine
        .assigned_model(agent.role)
        .or_else(|| Some(agent.model.as_str()).filter(|m| !m.trim().is_empty()))
        .unwrap_or(fallback)
        .to_string()
}

pub fn chat_metadata(task: &Task, agent: &Agent, phase: PhaseType, project: &Project) -> ChatMetadata {
    ChatMetadata {
        task_id: Some(task.id.clone()),
        agent: Some(agent.role.as_str().to_string()),
        phase: Some(phase.as_str().to_string()),
        project_id: Some(project.id.clone()),
        repo_path: project.repo_path().map(str::to_string),
        has_git: project.has_git,
    }
}

/// Full request for one phase execution.
pub fn build_payload(
    settings: &Settings,
    options: &ExecutionOptions,
    agent: &Agent,
    task: &Task,
    phase: PhaseType,
    project: &Project,
) -> RunPayload {
    let messages = vec![
        ChatMessage::system(system_prompt(agent, task, phase)),
        ChatMessage::user(user_prompt(phase)),
    ];
    let mut payload = RunPayload::new(select_model(settings, agent, &options.default_model), messages);
    payload.temperature = options.temperature;
    payload.max_tokens = options.max_tokens;
    payload.metadata = Some(chat_metadata(task, agent, phase, project));
    payload
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
