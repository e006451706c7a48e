//! Derived, read-only view over the agent roster.
//!
//! [`build_registry`] is recomputed from [`AppState`] on every call and never
//! cached. Roles referenced by the phase map but missing from the roster are
//! synthesized as inactive placeholders so lookups by role never miss.

use serde::Serialize;

use crate::phase_map::PhaseAgentMap;
use crate::settings::DEFAULT_MODEL;
use crate::state::AppState;
use crate::types::{Agent, AgentRole, AgentStatus, PhaseStatus, PhaseType, TerminalEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    Idle,
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAgent {
    #[serde(flatten)]
    pub agent: Agent,
    pub phase_types: Vec<PhaseType>,
    pub terminal_buffer: Vec<TerminalEntry>,
    pub runtime_status: RuntimeStatus,
    pub is_executing: bool,
    pub is_complete: bool,
    pub is_placeholder: bool,
}

/// A roster entry for a mapped role nobody has registered yet.
pub fn placeholder_agent(role: AgentRole, active: bool) -> Agent {
    let description = if active {
        "Auto-registered mapped agent"
    } else {
        "Unregistered agent slot"
    };
    let mut agent = Agent::new(role, DEFAULT_MODEL).with_description(description);
    agent.is_active = active;
    agent
}

/// Mapped roles that have no agent in the roster.
pub fn missing_mapped_roles(agents: &[Agent], map: &PhaseAgentMap) -> Vec<AgentRole> {
    map.roles()
        .into_iter()
        .filter(|role| !agents.iter().any(|a| a.role == *role))
        .collect()
}

pub fn build_registry(state: &AppState, map: &PhaseAgentMap) -> Vec<RegistryAgent> {
    let mut roster: Vec<(Agent, bool)> = state.agents.iter().map(|a| (a.clone(), false)).collect();
    for role in missing_mapped_roles(&state.agents, map) {
        roster.push((placeholder_agent(role, false), true));
    }

    let mut sorted_entries: Vec<&TerminalEntry> = state.terminal_entries.iter().collect();
    sorted_entries.sort_by_key(|e| e.timestamp);

    let active_task = state.active_task();

    roster
        .into_iter()
        .map(|(agent, is_placeholder)| {
            let phase_types = map.phases_for(agent.role);
            let terminal_buffer: Vec<TerminalEntry> = sorted_entries
                .iter()
                .filter(|e| e.agent_role == agent.role)
                .map(|e| (*e).clone())
                .collect();

            let relevant_statuses: Vec<PhaseStatus> = active_task
                .map(|task| {
                    task.phases
                        .iter()
                        .filter(|p| phase_types.contains(&p.id))
                        .map(|p| p.status)
                        .collect()
                })
                .unwrap_or_default();

            let is_streaming = state.streaming_log_for(&agent.id).is_some();
            let is_executing = agent.status == AgentStatus::Working
                || is_streaming
                || relevant_statuses.contains(&PhaseStatus::Active);
            let is_complete = relevant_statuses.contains(&PhaseStatus::Completed);

            let runtime_status = if agent.status == AgentStatus::Error {
                RuntimeStatus::Error
            } else if is_executing {
                RuntimeStatus::Running
            } else if is_complete {
                RuntimeStatus::Done
            } else {
                RuntimeStatus::Idle
            };

            RegistryAgent {
                agent,
                phase_types,
                terminal_buffer,
                runtime_status,
                is_executing,
                is_complete,
                is_placeholder,
            }
        })
        .collect()
}

pub fn find_by_role(registry: &[RegistryAgent], role: AgentRole) -> Option<&RegistryAgent> {
    registry.iter().find(|r| r.agent.role == role)
}

pub fn find_by_id<'a>(registry: &'a [RegistryAgent], id: &str) -> Option<&'a RegistryAgent> {
    registry.iter().find(|r| r.agent.id == id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogEntry, LogLevel, Task, TerminalEntryType};
    use chrono::{Duration, Utc};

    fn state_with_task() -> AppState {
        let mut state = AppState::default();
        state.agents.push(Agent::new(AgentRole::Coder, "codellama"));
        let task = Task::new("t", "p");
        state.ui.active_task_id = Some(task.id.clone());
        state.tasks.push(task);
        state
    }

    fn set_phase(state: &mut AppState, phase: PhaseType, status: PhaseStatus) {
        let task = &mut state.tasks[0];
        if let Some(p) = task.phase_mut(phase) {
            p.status = status;
        }
    }

    #[test]
    fn placeholders_fill_mapped_roles() {
        let state = state_with_task();
        let reg = build_registry(&state, &PhaseAgentMap::default());
        assert_eq!(reg.len(), 5);
        let writer = find_by_role(&reg, AgentRole::SpecWriter).unwrap();
        assert!(writer.is_placeholder);
        assert!(!writer.agent.is_active);
        assert_eq!(writer.agent.id, "agent-spec-writer");
        assert_eq!(writer.agent.name, "Spec Writer");
        assert!(!find_by_role(&reg, AgentRole::Coder).unwrap().is_placeholder);
    }

    #[test]
    fn runtime_status_priority() {
        let map = PhaseAgentMap::default();
        let mut state = state_with_task();

        let reg = build_registry(&state, &map);
        assert_eq!(find_by_role(&reg, AgentRole::Coder).unwrap().runtime_status, RuntimeStatus::Idle);

        set_phase(&mut state, PhaseType::Code, PhaseStatus::Completed);
        let reg = build_registry(&state, &map);
        assert_eq!(find_by_role(&reg, AgentRole::Coder).unwrap().runtime_status, RuntimeStatus::Done);

        set_phase(&mut state, PhaseType::Code, PhaseStatus::Active);
        let reg = build_registry(&state, &map);
        let coder = find_by_role(&reg, AgentRole::Coder).unwrap();
        assert_eq!(coder.runtime_status, RuntimeStatus::Running);
        assert!(coder.is_executing);

        state.agents[0].status = AgentStatus::Error;
        let reg = build_registry(&state, &map);
        assert_eq!(find_by_role(&reg, AgentRole::Coder).unwrap().runtime_status, RuntimeStatus::Error);
    }

    #[test]
    fn streaming_log_means_running() {
        let map = PhaseAgentMap::default();
        let mut state = state_with_task();
        state.ui.active_task_id = None;
        state
            .streaming_logs
            .push(LogEntry::for_agent(LogLevel::Agent, "agent-coder", "tok").streaming());
        let reg = build_registry(&state, &map);
        assert_eq!(find_by_id(&reg, "agent-coder").unwrap().runtime_status, RuntimeStatus::Running);
    }

    #[test]
    fn terminal_buffer_is_filtered_and_sorted() {
        let mut state = state_with_task();
        let now = Utc::now();
        let mut late = TerminalEntry::new(AgentRole::Coder, PhaseType::Code, TerminalEntryType::Output, "b");
        late.timestamp = now;
        let mut early = TerminalEntry::new(AgentRole::Coder, PhaseType::Code, TerminalEntryType::Output, "a");
        early.timestamp = now - Duration::seconds(5);
        let other = TerminalEntry::new(AgentRole::Planner, PhaseType::Plan, TerminalEntryType::Output, "x");
        state.terminal_entries = vec![late, other, early];

        let reg = build_registry(&state, &PhaseAgentMap::default());
        let coder = find_by_role(&reg, AgentRole::Coder).unwrap();
        let contents: Vec<&str> = coder.terminal_buffer.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
    }

    #[test]
    fn phase_types_follow_map() {
        let map = PhaseAgentMap::with_overrides([(PhaseType::Review, AgentRole::Qa)]).unwrap();
        let state = AppState::default();
        let reg = build_registry(&state, &map);
        assert_eq!(
            find_by_role(&reg, AgentRole::Qa).unwrap().phase_types,
            vec![PhaseType::Qa, PhaseType::Review]
        );
        assert!(find_by_role(&reg, AgentRole::QaReviewer).is_none());
    }
}
