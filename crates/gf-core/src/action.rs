//! The closed set of state mutations.
//!
//! Actions carry every timestamp and id they need so that the reducer stays
//! a pure function of `(state, action)`.

use chrono::{DateTime, Utc};

use crate::settings::{ProjectSettings, ProviderId, Settings};
use crate::snapshot::Snapshot;
use crate::types::{
    Agent, AgentRole, AgentStatus, FileOpProposal, LogEntry, Phase, PhaseArtifact, PhaseStatus,
    PhaseType, Project, ProposalStatus, Task, TaskStatus, TerminalEntry, ToolName,
};

// ---------------------------------------------------------------------------
// Patches
// ---------------------------------------------------------------------------

/// Partial update of a [`Task`]. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub assigned_agents: Option<Vec<String>>,
    pub branch: Option<Option<String>>,
    pub human_approval_required: Option<bool>,
    pub human_approval_phase: Option<Option<PhaseType>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Partial update of a [`Phase`]. Nested `Option`s distinguish "leave" from
/// "clear".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhasePatch {
    pub status: Option<PhaseStatus>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub artifact: Option<Option<PhaseArtifact>>,
    pub error: Option<Option<String>>,
}

impl PhasePatch {
    /// Mark active, stamp the start and clear any previous outcome.
    pub fn start(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(PhaseStatus::Active),
            started_at: Some(Some(at)),
            completed_at: Some(None),
            error: Some(None),
            ..Self::default()
        }
    }

    pub fn complete(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(PhaseStatus::Completed),
            completed_at: Some(Some(at)),
            ..Self::default()
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: Some(PhaseStatus::Failed),
            error: Some(Some(error.into())),
            ..Self::default()
        }
    }

    pub fn skip() -> Self {
        Self {
            status: Some(PhaseStatus::Skipped),
            ..Self::default()
        }
    }

    pub fn with_artifact(mut self, artifact: PhaseArtifact) -> Self {
        self.artifact = Some(Some(artifact));
        self
    }
}

/// Partial update of an [`Agent`]. Role and category are not patchable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub model: Option<String>,
    pub description: Option<String>,
    pub constraints: Option<Vec<String>>,
    pub allowed_tools: Option<Vec<ToolName>>,
    pub is_active: Option<bool>,
    pub status: Option<AgentStatus>,
    pub current_task_id: Option<Option<String>>,
}

impl AgentPatch {
    pub fn working(task_id: impl Into<String>) -> Self {
        Self {
            status: Some(AgentStatus::Working),
            current_task_id: Some(Some(task_id.into())),
            ..Self::default()
        }
    }

    pub fn idle() -> Self {
        Self {
            status: Some(AgentStatus::Idle),
            current_task_id: Some(None),
            ..Self::default()
        }
    }

    /// Error status; the current task is kept so the failure stays attributable.
    pub fn error() -> Self {
        Self {
            status: Some(AgentStatus::Error),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // --- Projects ---
    SetProjects(Vec<Project>),
    /// Adds the project and makes it active.
    AddProject(Project),
    SetActiveProject(Option<String>),

    // --- Tasks ---
    SetActiveTask(Option<String>),
    AddTask(Task),
    UpdateTask {
        id: String,
        patch: TaskPatch,
        at: DateTime<Utc>,
    },
    /// Removes the task; clears the active selection if it pointed there.
    DeleteTask(String),
    SetTaskPhase {
        task_id: String,
        phase: PhaseType,
        at: DateTime<Utc>,
    },
    UpdatePhase {
        task_id: String,
        phase: PhaseType,
        patch: PhasePatch,
        at: DateTime<Utc>,
    },
    /// Undo an execution start: put the phase back wholesale (only if it is
    /// still `active`) together with the task's previous status and current
    /// phase.
    RestorePhase {
        task_id: String,
        phase: Phase,
        task_status: TaskStatus,
        current_phase: PhaseType,
        at: DateTime<Utc>,
    },

    // --- Logs ---
    AddLogEntry(LogEntry),
    /// Drop logs attributed to one agent, or all logs when `None`.
    ClearLogs(Option<String>),
    /// Append to the agent's open streaming entry, or open one with
    /// `entry_id` if none exists.
    AppendStreamingToken {
        agent_id: String,
        phase: Option<PhaseType>,
        token: String,
        entry_id: String,
        at: DateTime<Utc>,
    },
    /// Finalize open streaming entries for one agent, or for all when `None`.
    EndStreamingLog(Option<String>),

    // --- Agents ---
    AddAgent(Agent),
    RemoveAgent(String),
    UpdateAgent {
        id: String,
        patch: AgentPatch,
    },
    UpdateAgentMcpBindings {
        agent_id: String,
        mcp_ids: Vec<String>,
    },

    // --- Settings ---
    SetActiveProvider(ProviderId),
    SetProviderConnection {
        provider: ProviderId,
        connected: bool,
    },
    /// Store discovered models; empty role assignments take the first one.
    SetAvailableModels(Vec<String>),
    AssignModel {
        role: AgentRole,
        model: String,
    },
    UpdateProjectSettings(ProjectSettings),
    ReplaceSettings(Settings),

    // --- Terminal ---
    AddTerminalEntry(TerminalEntry),
    ClearTerminalEntries(Option<AgentRole>),

    // --- Proposals ---
    AddFileOpProposal(FileOpProposal),
    /// Ignored unless the proposal is `pending`.
    UpdateFileOpProposal {
        id: String,
        status: ProposalStatus,
        error: Option<String>,
    },

    // --- Bootstrap ---
    Hydrate(Snapshot),
}

impl Action {
    /// Stable name used in logs and change notifications.
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetProjects(_) => "set_projects",
            Action::AddProject(_) => "add_project",
            Action::SetActiveProject(_) => "set_active_project",
            Action::SetActiveTask(_) => "set_active_task",
            Action::AddTask(_) => "add_task",
            Action::UpdateTask { .. } => "update_task",
            Action::DeleteTask(_) => "delete_task",
            Action::SetTaskPhase { .. } => "set_task_phase",
            Action::UpdatePhase { .. } => "update_phase",
            Action::RestorePhase { .. } => "restore_phase",
            Action::AddLogEntry(_) => "add_log_entry",
            Action::ClearLogs(_) => "clear_logs",
            Action::AppendStreamingToken { .. } => "append_streaming_token",
            Action::EndStreamingLog(_) => "end_streaming_log",
            Action::AddAgent(_) => "add_agent",
            Action::RemoveAgent(_) => "remove_agent",
            Action::UpdateAgent { .. } => "update_agent",
            Action::UpdateAgentMcpBindings { .. } => "update_agent_mcp_bindings",
            Action::SetActiveProvider(_) => "set_active_provider",
            Action::SetProviderConnection { .. } => "set_provider_connection",
            Action::SetAvailableModels(_) => "set_available_models",
            Action::AssignModel { .. } => "assign_model",
            Action::UpdateProjectSettings(_) => "update_project_settings",
            Action::ReplaceSettings(_) => "replace_settings",
            Action::AddTerminalEntry(_) => "add_terminal_entry",
            Action::ClearTerminalEntries(_) => "clear_terminal_entries",
            Action::AddFileOpProposal(_) => "add_file_op_proposal",
            Action::UpdateFileOpProposal { .. } => "update_file_op_proposal",
            Action::Hydrate(_) => "hydrate",
        }
    }
}
