//! The single pure reducer over [`AppState`].
//!
//! No I/O, no clock, no id generation: everything time- or identity-related
//! arrives inside the [`Action`]. Actions that would break an invariant are
//! ignored and the state is returned unchanged.

use crate::action::{Action, AgentPatch, PhasePatch, TaskPatch};
use crate::state::AppState;
use crate::types::{Agent, LogEntry, LogLevel, PhaseStatus, ProposalStatus, Task};

pub fn reduce(mut state: AppState, action: Action) -> AppState {
    match action {
        // --- Projects ---
        Action::SetProjects(projects) => {
            state.projects = projects;
        }
        Action::AddProject(project) => {
            state.ui.active_project_id = Some(project.id.clone());
            state.projects.retain(|p| p.id != project.id);
            state.projects.push(project);
        }
        Action::SetActiveProject(id) => {
            state.ui.active_project_id = id;
        }

        // --- Tasks ---
        Action::SetActiveTask(id) => {
            state.ui.active_task_id = id;
        }
        Action::AddTask(mut task) => {
            if state.task(&task.id).is_none() {
                task.normalize_phase_order();
                state.tasks.push(task);
            }
        }
        Action::UpdateTask { id, patch, at } => {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
                apply_task_patch(task, patch);
                task.updated_at = at;
            }
        }
        Action::DeleteTask(id) => {
            state.tasks.retain(|t| t.id != id);
            if state.ui.active_task_id.as_deref() == Some(id.as_str()) {
                state.ui.active_task_id = None;
            }
        }
        Action::SetTaskPhase { task_id, phase, at } => {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                if task.has_phase(phase) {
                    task.current_phase = phase;
                    task.updated_at = at;
                }
            }
        }
        Action::UpdatePhase {
            task_id,
            phase,
            patch,
            at,
        } => {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                if apply_phase_patch(task, phase, patch) {
                    task.updated_at = at;
                }
            }
        }
        Action::RestorePhase {
            task_id,
            phase,
            task_status,
            current_phase,
            at,
        } => {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                let still_active = task
                    .phase(phase.id)
                    .is_some_and(|p| p.status == PhaseStatus::Active);
                if still_active {
                    if let Some(slot) = task.phase_mut(phase.id) {
                        *slot = phase;
                    }
                    task.status = task_status;
                    if task.has_phase(current_phase) {
                        task.current_phase = current_phase;
                    }
                    task.updated_at = at;
                }
            }
        }

        // --- Logs ---
        Action::AddLogEntry(entry) => {
            state.streaming_logs.push(entry);
        }
        Action::ClearLogs(agent_id) => match agent_id {
            Some(agent_id) => state.streaming_logs.retain(|l| {
                l.source != agent_id && l.agent_id.as_deref() != Some(agent_id.as_str())
            }),
            None => state.streaming_logs.clear(),
        },
        Action::AppendStreamingToken {
            agent_id,
            phase,
            token,
            entry_id,
            at,
        } => {
            let open = state
                .streaming_logs
                .iter_mut()
                .find(|l| l.is_streaming && l.agent_id.as_deref() == Some(agent_id.as_str()));
            match open {
                Some(entry) => entry.message.push_str(&token),
                None => state.streaming_logs.push(LogEntry {
                    id: entry_id,
                    timestamp: at,
                    level: LogLevel::Agent,
                    source: agent_id.clone(),
                    message: token,
                    agent_id: Some(agent_id),
                    phase,
                    is_streaming: true,
                }),
            }
        }
        Action::EndStreamingLog(agent_id) => {
            for log in state.streaming_logs.iter_mut().filter(|l| l.is_streaming) {
                let matches = match agent_id.as_deref() {
                    Some(id) => log.agent_id.as_deref() == Some(id),
                    None => true,
                };
                if matches {
                    log.is_streaming = false;
                }
            }
        }

        // --- Agents ---
        Action::AddAgent(agent) => {
            if state.agent(&agent.id).is_none() {
                state.agents.push(agent.normalized());
            }
        }
        Action::RemoveAgent(id) => {
            state.agents.retain(|a| a.id != id);
        }
        Action::UpdateAgent { id, patch } => {
            if let Some(agent) = state.agents.iter_mut().find(|a| a.id == id) {
                apply_agent_patch(agent, patch);
            }
        }
        Action::UpdateAgentMcpBindings { agent_id, mcp_ids } => {
            if let Some(agent) = state.agents.iter_mut().find(|a| a.id == agent_id) {
                agent.mcp_bindings = mcp_ids;
            }
        }

        // --- Settings ---
        Action::SetActiveProvider(provider) => {
            state.settings.execution_engine.active_provider = provider;
        }
        Action::SetProviderConnection {
            provider,
            connected,
        } => {
            state
                .settings
                .execution_engine
                .set_connected(provider, connected);
        }
        Action::SetAvailableModels(models) => {
            let engine = &mut state.settings.execution_engine;
            if let Some(first) = models.first() {
                for model in engine.model_assignments.values_mut() {
                    if model.trim().is_empty() {
                        *model = first.clone();
                    }
                }
            }
            engine.available_models = models;
        }
        Action::AssignModel { role, model } => {
            state
                .settings
                .execution_engine
                .model_assignments
                .insert(role, model);
        }
        Action::UpdateProjectSettings(project) => {
            state.settings.project = project;
        }
        Action::ReplaceSettings(settings) => {
            state.settings = settings;
        }

        // --- Terminal ---
        Action::AddTerminalEntry(entry) => {
            state.terminal_entries.push(entry);
        }
        Action::ClearTerminalEntries(role) => match role {
            Some(role) => state.terminal_entries.retain(|e| e.agent_role != role),
            None => state.terminal_entries.clear(),
        },

        // --- Proposals ---
        Action::AddFileOpProposal(proposal) => {
            if state.proposal(&proposal.id).is_none() {
                state.file_op_proposals.push(proposal);
            }
        }
        Action::UpdateFileOpProposal { id, status, error } => {
            if let Some(p) = state.file_op_proposals.iter_mut().find(|p| p.id == id) {
                if p.status.can_transition_to(&status) {
                    p.status = status;
                    p.error = match status {
                        ProposalStatus::Error => error,
                        _ => None,
                    };
                }
            }
        }

        // --- Bootstrap ---
        Action::Hydrate(snapshot) => {
            if let Some(tasks) = snapshot.tasks {
                state.tasks = tasks
                    .into_iter()
                    .map(|mut t| {
                        t.normalize_phase_order();
                        t
                    })
                    .collect();
            }
            if let Some(agents) = snapshot.agents {
                state.agents = agents.into_iter().map(Agent::normalized).collect();
            }
            if let Some(settings) = snapshot.settings {
                state.settings = settings;
            }
            if let Some(entries) = snapshot.terminal_entries {
                state.terminal_entries = entries;
            }
            if let Some(logs) = snapshot.streaming_logs {
                state.streaming_logs = logs;
            }
            if let Some(projects) = snapshot.projects {
                state.projects = projects;
            }
            if let Some(proposals) = snapshot.file_op_proposals {
                state.file_op_proposals = proposals;
            }
            if let Some(ui) = snapshot.ui {
                if ui.active_task_id.is_some() {
                    state.ui.active_task_id = ui.active_task_id;
                }
                if ui.active_project_id.is_some() {
                    state.ui.active_project_id = ui.active_project_id;
                }
            }
            // Drop selections that point nowhere.
            if state.active_task().is_none() {
                state.ui.active_task_id = None;
            }
            if state.active_project().is_none() {
                state.ui.active_project_id = None;
            }
        }
    }
    state
}

fn apply_task_patch(task: &mut Task, patch: TaskPatch) {
    if let Some(title) = patch.title {
        task.title = title;
    }
    if let Some(description) = patch.description {
        task.description = description;
    }
    if let Some(status) = patch.status {
        task.status = status;
    }
    if let Some(agents) = patch.assigned_agents {
        task.assigned_agents = agents;
    }
    if let Some(branch) = patch.branch {
        task.branch = branch;
    }
    if let Some(required) = patch.human_approval_required {
        task.human_approval_required = required;
    }
    if let Some(phase) = patch.human_approval_phase {
        task.human_approval_phase = phase;
    }
}

/// Apply `patch` to one phase of `task`. Returns `false` (and leaves the task
/// untouched) when the phase is missing or the status change is not allowed.
fn apply_phase_patch(task: &mut Task, phase: crate::types::PhaseType, patch: PhasePatch) -> bool {
    let Some(current) = task.phase(phase).map(|p| p.status) else {
        return false;
    };

    if let Some(target) = patch.status {
        if target != current && !current.can_transition_to(&target) {
            return false;
        }
        if target == PhaseStatus::Active
            && task
                .phases
                .iter()
                .any(|p| p.id != phase && p.status == PhaseStatus::Active)
        {
            return false;
        }
    }

    let Some(p) = task.phase_mut(phase) else {
        return false;
    };
    if let Some(status) = patch.status {
        p.status = status;
    }
    if let Some(started_at) = patch.started_at {
        p.started_at = started_at;
    }
    if let Some(completed_at) = patch.completed_at {
        p.completed_at = completed_at;
    }
    if let Some(artifact) = patch.artifact {
        p.artifact = artifact;
    }
    if let Some(error) = patch.error {
        p.error = error;
    }
    true
}

fn apply_agent_patch(agent: &mut Agent, patch: AgentPatch) {
    if let Some(name) = patch.name {
        agent.name = name;
    }
    if let Some(model) = patch.model {
        agent.model = model;
    }
    if let Some(description) = patch.description {
        agent.description = description;
    }
    if let Some(constraints) = patch.constraints {
        agent.constraints = constraints;
    }
    if let Some(tools) = patch.allowed_tools {
        agent.allowed_tools = tools;
    }
    if let Some(active) = patch.is_active {
        agent.is_active = active;
    }
    if let Some(status) = patch.status {
        agent.status = status;
    }
    if let Some(task_id) = patch.current_task_id {
        agent.current_task_id = task_id;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
