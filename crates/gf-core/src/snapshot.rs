//! Persisted form of [`AppState`].
//!
//! Every collection is optional: a snapshot only replaces what it carries.
//! There is no schema version; compatibility is by shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;
use crate::state::{AppState, UiState};
use crate::timestamp;
use crate::types::{
    Agent, AgentStatus, FileOpProposal, LogEntry, PhaseStatus, Project, Task, TerminalEntry,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<Agent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_entries: Option<Vec<TerminalEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_logs: Option<Vec<LogEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_op_proposals: Option<Vec<FileOpProposal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiState>,
}

impl Snapshot {
    /// Capture the persistable part of `state`. Open streaming entries are
    /// left out.
    pub fn capture(state: &AppState) -> Self {
        Self {
            tasks: Some(state.tasks.clone()),
            agents: Some(state.agents.clone()),
            settings: Some(state.settings.clone()),
            terminal_entries: Some(state.terminal_entries.clone()),
            streaming_logs: Some(
                state
                    .streaming_logs
                    .iter()
                    .filter(|l| !l.is_streaming)
                    .cloned()
                    .collect(),
            ),
            projects: Some(state.projects.clone()),
            file_op_proposals: Some(state.file_op_proposals.clone()),
            ui: Some(state.ui.clone()),
        }
    }

    /// `true` when the snapshot carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_none()
            && self.agents.is_none()
            && self.settings.is_none()
            && self.terminal_entries.is_none()
            && self.streaming_logs.is_none()
            && self.projects.is_none()
            && self.file_op_proposals.is_none()
            && self.ui.is_none()
    }

    /// Reset anything that implies live work. No process survives a
    /// restart, so agents go idle, streams close and active phases return
    /// to pending.
    pub fn quiesce(mut self) -> Self {
        if let Some(agents) = self.agents.as_mut() {
            for agent in agents.iter_mut() {
                agent.status = AgentStatus::Idle;
                agent.current_task_id = None;
            }
        }
        if let Some(logs) = self.streaming_logs.as_mut() {
            for log in logs.iter_mut() {
                log.is_streaming = false;
            }
        }
        if let Some(tasks) = self.tasks.as_mut() {
            for task in tasks.iter_mut() {
                for phase in task.phases.iter_mut() {
                    if phase.status == PhaseStatus::Active {
                        phase.status = PhaseStatus::Pending;
                        phase.started_at = None;
                    }
                }
                task.normalize_phase_order();
            }
        }
        self
    }
}

/// Envelope written by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    pub snapshot: Snapshot,
    #[serde(deserialize_with = "timestamp::flexible")]
    pub updated_at: DateTime<Utc>,
}

impl StoredSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            updated_at: Utc::now(),
        }
    }

    /// Accept either an envelope (`{"snapshot": …}`) or a bare snapshot.
    pub fn unwrap_value(value: serde_json::Value) -> Result<Snapshot, serde_json::Error> {
        match value {
            serde_json::Value::Object(mut obj) if obj.contains_key("snapshot") => {
                let inner = obj.remove("snapshot").unwrap_or(serde_json::Value::Null);
                serde_json::from_value(inner)
            }
            other => serde_json::from_value(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
