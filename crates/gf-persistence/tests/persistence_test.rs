//! Integration tests for the persistence tiers and the bridge, with the
//! remote tier served by an in-process axum app.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use gf_core::action::{Action, AgentPatch};
use gf_core::snapshot::{Snapshot, StoredSnapshot};
use gf_core::store::Store;
use gf_core::types::*;
use gf_persistence::{
    hydrate, save_if_idle, FileBackend, PersistenceBridge, RemoteBackend, SnapshotBackend,
    SqliteBackend,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Doc = Arc<Mutex<Option<Value>>>;

async fn remote_store(doc: Doc) -> String {
    async fn read(State(doc): State<Doc>) -> impl IntoResponse {
        match doc.lock().unwrap().clone() {
            Some(value) => Json(value).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }
    async fn write(State(doc): State<Doc>, Json(body): Json<Value>) -> StatusCode {
        *doc.lock().unwrap() = Some(body);
        StatusCode::NO_CONTENT
    }

    let app = Router::new()
        .route("/state", get(read).post(write))
        .with_state(doc);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/state")
}

/// A store with a project, a task mid-way through its phases, a finished
/// log and a pending proposal.
fn populated_store() -> Store {
    let store = Store::default();
    let project = Project::new("demo", Some("/work/demo".into()));
    store.dispatch(Action::AddProject(project.clone()));
    let task = Task::new("Add login", &project.id).with_description("OAuth only");
    let task_id = task.id.clone();
    store.dispatch(Action::AddTask(task));
    store.dispatch(Action::SetActiveTask(Some(task_id.clone())));
    store.dispatch(Action::AddLogEntry(LogEntry::new(LogLevel::Info, "system", "ready")));

    let mut proposal = FileOpProposal::pending(vec![FileOp {
        op_type: FileOpType::Create,
        path: "a.ts".into(),
        diff: "x".into(),
    }]);
    proposal.task_id = Some(task_id);
    proposal.repo_path = project.path.clone();
    store.dispatch(Action::AddFileOpProposal(proposal));
    store
}

// ---------------------------------------------------------------------------
// Remote tier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_round_trip() {
    let doc: Doc = Arc::default();
    let url = remote_store(doc.clone()).await;
    let backend = RemoteBackend::new(&url);

    assert!(backend.load().await.unwrap().is_none());

    let store = populated_store();
    let stored = StoredSnapshot::new(store.read(Snapshot::capture));
    backend.save(&stored).await.unwrap();
    assert!(doc.lock().unwrap().as_ref().unwrap()["snapshot"]["tasks"].is_array());

    let loaded = backend.load().await.unwrap().unwrap();
    assert_eq!(loaded, stored.snapshot);
}

#[tokio::test]
async fn remote_accepts_bare_snapshot_with_string_dates() {
    let doc: Doc = Arc::new(Mutex::new(Some(serde_json::json!({
        "projects": [{
            "id": "proj-1",
            "name": "demo",
            "path": "/work/demo",
            "createdAt": "2024-05-01T10:00:00.000Z",
            "lastOpenedAt": "2024-05-01T10:00:00.000Z"
        }]
    }))));
    let backend = RemoteBackend::new(remote_store(doc).await);
    let loaded = backend.load().await.unwrap().unwrap();
    let project = &loaded.projects.unwrap()[0];
    assert_eq!(project.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
}

#[tokio::test]
async fn unreachable_remote_falls_through_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = Arc::new(FileBackend::new(dir.path().join("state.json")));
    let bridge = PersistenceBridge::new()
        .with_backend(Arc::new(RemoteBackend::new("http://127.0.0.1:1/state")))
        .with_backend(file.clone());

    let store = populated_store();
    assert!(save_if_idle(&store, &bridge).await);
    assert!(file.load().await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Round trip through the bridge
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_round_trip_restores_entities() {
    let dir = tempfile::tempdir().unwrap();
    let db = SqliteBackend::open(dir.path().join("state.db")).await.unwrap();
    let bridge = PersistenceBridge::new()
        .with_backend(Arc::new(db))
        .with_backend(Arc::new(FileBackend::new(dir.path().join("state.json"))));

    let source = populated_store();
    assert!(save_if_idle(&source, &bridge).await);

    let target = Store::default();
    assert!(hydrate(&target, &bridge).await);

    let (src, dst) = (source.snapshot(), target.snapshot());
    assert_eq!(dst.tasks, src.tasks);
    assert_eq!(dst.agents, src.agents);
    assert_eq!(dst.file_op_proposals, src.file_op_proposals);
    assert_eq!(dst.projects, src.projects);
    assert_eq!(dst.ui, src.ui);
    assert_eq!(
        dst.active_task().map(|t| t.title.as_str()),
        Some("Add login")
    );
}

#[tokio::test]
async fn busy_store_is_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let file = Arc::new(FileBackend::new(dir.path().join("state.json")));
    let bridge = PersistenceBridge::new().with_backend(file.clone());

    let store = populated_store();
    let agent_id = store.read(|s| s.agents[0].id.clone());
    store.dispatch(Action::UpdateAgent {
        id: agent_id,
        patch: AgentPatch::working("task-1"),
    });
    assert!(!save_if_idle(&store, &bridge).await);
    assert!(file.load().await.unwrap().is_none());
}

#[tokio::test]
async fn hydration_returns_active_phases_to_pending() {
    let dir = tempfile::tempdir().unwrap();
    let file = Arc::new(FileBackend::new(dir.path().join("state.json")));
    let bridge = PersistenceBridge::new().with_backend(file.clone());

    let mut task = Task::new("t", "proj-1");
    task.phases[0].status = PhaseStatus::Active;
    task.phases[0].started_at = Some(chrono::Utc::now());
    let stored = StoredSnapshot::new(Snapshot {
        tasks: Some(vec![task.clone()]),
        ..Snapshot::default()
    });
    file.save(&stored).await.unwrap();

    let store = Store::default();
    assert!(hydrate(&store, &bridge).await);
    let restored = store.read(|s| s.task(&task.id).cloned()).unwrap();
    assert_eq!(restored.phases[0].status, PhaseStatus::Pending);
    assert!(restored.active_phase().is_none());
}
