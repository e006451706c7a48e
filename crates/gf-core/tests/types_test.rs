use gf_core::snapshot::{Snapshot, StoredSnapshot};
use gf_core::types::*;

#[test]
fn task_wire_shape_is_camel_case() {
    let task = Task::new("Add login", "proj-1").with_description("OAuth flow");
    let json = serde_json::to_value(&task).expect("serialize");
    assert_eq!(json["currentPhase"], "spec");
    assert_eq!(json["status"], "backlog");
    assert_eq!(json["projectId"], "proj-1");
    assert_eq!(json["phases"].as_array().unwrap().len(), 5);
    assert_eq!(json["phases"][2]["name"], "Implementation");
    assert!(json["phases"][0].get("startedAt").is_none());
}

#[test]
fn in_progress_status_is_snake_case() {
    let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
    assert_eq!(json, "\"in_progress\"");
}

#[test]
fn legacy_snapshot_with_epoch_millis_loads() {
    let raw = r#"{
        "snapshot": {
            "tasks": [{
                "id": "task-1",
                "title": "Legacy",
                "description": "",
                "status": "in_progress",
                "currentPhase": "code",
                "phases": [
                    {"id": "spec", "name": "Specification", "status": "completed",
                     "startedAt": "2024-05-01T10:00:00.000Z", "completedAt": "2024-05-01T10:05:00.000Z"},
                    {"id": "code", "name": "Implementation", "status": "active",
                     "startedAt": "2024-05-01T10:06:00.000Z"}
                ],
                "projectId": "proj-1",
                "createdAt": "2024-05-01T09:00:00.000Z",
                "updatedAt": "2024-05-01T10:06:00.000Z",
                "assignedAgents": [],
                "humanApprovalRequired": false
            }],
            "terminalEntries": [{
                "id": "term-1", "agentRole": "coder", "phase": "code",
                "type": "output", "content": "hi", "timestamp": 1714557960000
            }],
            "fileOpProposals": [{
                "id": "fileops-1",
                "ops": [{"type": "create", "path": "a.ts", "diff": "x"}],
                "createdAt": 1714557960000,
                "status": "pending",
                "projectId": null,
                "repoPath": null
            }]
        },
        "updatedAt": 1714557960000
    }"#;
    let stored: StoredSnapshot = serde_json::from_str(raw).expect("legacy snapshot");
    let snap = stored.snapshot.quiesce();
    let task = &snap.tasks.as_ref().unwrap()[0];
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.phase(PhaseType::Code).unwrap().status, PhaseStatus::Pending);
    assert!(task.phase(PhaseType::Spec).unwrap().completed_at.is_some());
    let entry = &snap.terminal_entries.as_ref().unwrap()[0];
    assert_eq!(entry.timestamp.timestamp_millis(), 1_714_557_960_000);
    let proposal = &snap.file_op_proposals.as_ref().unwrap()[0];
    assert!(proposal.project_id.is_none());
    assert_eq!(proposal.ops[0].op_type, FileOpType::Create);
}

#[test]
fn snapshot_roundtrip_is_lossless() {
    let mut state = gf_core::state::AppState::default();
    let mut task = Task::new("Round trip", "proj-1");
    task.phases[0].status = PhaseStatus::Completed;
    state.tasks.push(task);
    state.agents.push(Agent::new(AgentRole::Coder, "codellama"));
    state.file_op_proposals.push(FileOpProposal::pending(vec![FileOp {
        op_type: FileOpType::Modify,
        path: "src/main.rs".into(),
        diff: "@@ -1 +1 @@".into(),
    }]));

    let snap = Snapshot::capture(&state);
    let text = serde_json::to_string(&StoredSnapshot::new(snap.clone())).unwrap();
    let back: StoredSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(back.snapshot, snap);
    assert_eq!(
        serde_json::to_string(&back.snapshot).unwrap(),
        serde_json::to_string(&snap).unwrap()
    );
}

#[test]
fn unknown_role_is_rejected() {
    let res: Result<AgentRole, _> = serde_json::from_str("\"wizard\"");
    assert!(res.is_err());
}
