use serde::{Deserialize, Serialize};

use crate::settings::Settings;
use crate::types::{
    Agent, AgentRole, AgentStatus, FileOpProposal, LogEntry, Project, Task, TerminalEntry,
};

/// Selection state that survives restarts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    #[serde(default)]
    pub active_task_id: Option<String>,
    #[serde(default)]
    pub active_project_id: Option<String>,
}

/// The canonical application state tree.
///
/// Only [`crate::reducer::reduce`] produces new values of this type. The
/// active task and project are stored by id and looked up on read, so the
/// "active" view can never diverge from the task list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub agents: Vec<Agent>,
    pub settings: Settings,
    pub streaming_logs: Vec<LogEntry>,
    pub terminal_entries: Vec<TerminalEntry>,
    pub file_op_proposals: Vec<FileOpProposal>,
    pub ui: UiState,
}

impl AppState {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agent_by_role(&self, role: AgentRole) -> Option<&Agent> {
        self.agents.iter().find(|a| a.role == role)
    }

    pub fn proposal(&self, id: &str) -> Option<&FileOpProposal> {
        self.file_op_proposals.iter().find(|p| p.id == id)
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.ui.active_task_id.as_deref().and_then(|id| self.task(id))
    }

    pub fn active_project(&self) -> Option<&Project> {
        self.ui
            .active_project_id
            .as_deref()
            .and_then(|id| self.project(id))
    }

    /// The in-flight streaming log for `agent_id`, if one is open.
    pub fn streaming_log_for(&self, agent_id: &str) -> Option<&LogEntry> {
        self.streaming_logs
            .iter()
            .find(|l| l.is_streaming && l.agent_id.as_deref() == Some(agent_id))
    }

    /// `true` while a stream is open or an agent is working. Snapshots are
    /// not taken in this state.
    pub fn is_busy(&self) -> bool {
        self.streaming_logs.iter().any(|l| l.is_streaming)
            || self.agents.iter().any(|a| a.status == AgentStatus::Working)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    #[test]
    fn active_task_follows_id() {
        let mut state = AppState::default();
        let task = Task::new("a", "p");
        let id = task.id.clone();
        state.tasks.push(task);
        assert!(state.active_task().is_none());
        state.ui.active_task_id = Some(id.clone());
        assert_eq!(state.active_task().map(|t| t.id.as_str()), Some(id.as_str()));
        state.tasks.clear();
        assert!(state.active_task().is_none());
    }

    #[test]
    fn busy_when_streaming_or_working() {
        let mut state = AppState::default();
        assert!(!state.is_busy());
        state
            .streaming_logs
            .push(LogEntry::for_agent(LogLevel::Agent, "agent-coder", "x").streaming());
        assert!(state.is_busy());
        state.streaming_logs.clear();
        let mut agent = Agent::new(AgentRole::Coder, "m");
        agent.status = AgentStatus::Working;
        state.agents.push(agent);
        assert!(state.is_busy());
    }
}
