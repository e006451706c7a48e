use chrono::Utc;
use gf_core::action::{Action, AgentPatch, PhasePatch};
use gf_core::phase_map::PhaseAgentMap;
use gf_core::registry::RuntimeStatus;
use gf_core::state::AppState;
use gf_core::store::Store;
use gf_core::types::*;

fn seeded_store() -> (Store, String) {
    let store = Store::new(AppState::default(), PhaseAgentMap::default());
    let task = Task::new("Ship feature", "proj-1");
    let id = task.id.clone();
    store.dispatch(Action::AddTask(task));
    store.dispatch(Action::SetActiveTask(Some(id.clone())));
    (store, id)
}

fn active_count(store: &Store, id: &str) -> usize {
    store.read(|s| {
        s.task(id)
            .map(|t| t.phases.iter().filter(|p| p.status == PhaseStatus::Active).count())
            .unwrap_or(0)
    })
}

#[test]
fn at_most_one_active_phase_under_any_sequence() {
    let (store, id) = seeded_store();
    let sequence = [
        (PhaseType::Spec, PhasePatch::start(Utc::now())),
        (PhaseType::Code, PhasePatch::start(Utc::now())),
        (PhaseType::Spec, PhasePatch::complete(Utc::now())),
        (PhaseType::Code, PhasePatch::start(Utc::now())),
        (PhaseType::Qa, PhasePatch::start(Utc::now())),
        (PhaseType::Code, PhasePatch::fail("boom")),
        (PhaseType::Qa, PhasePatch::start(Utc::now())),
        (PhaseType::Code, PhasePatch::start(Utc::now())),
        (PhaseType::Review, PhasePatch::complete(Utc::now())),
    ];
    for (phase, patch) in sequence {
        store.dispatch(Action::UpdatePhase {
            task_id: id.clone(),
            phase,
            patch,
            at: Utc::now(),
        });
        assert!(active_count(&store, &id) <= 1);
    }
    store.read(|s| {
        let task = s.task(&id).unwrap();
        assert_eq!(task.phase(PhaseType::Spec).unwrap().status, PhaseStatus::Completed);
        assert_eq!(task.phase(PhaseType::Code).unwrap().status, PhaseStatus::Failed);
        assert_eq!(task.phase(PhaseType::Qa).unwrap().status, PhaseStatus::Active);
        assert_eq!(task.phase(PhaseType::Review).unwrap().status, PhaseStatus::Pending);
    });
}

#[test]
fn registry_tracks_execution_lifecycle() {
    let (store, id) = seeded_store();
    let coder_status = |store: &Store| {
        store
            .registry()
            .into_iter()
            .find(|r| r.agent.role == AgentRole::Coder)
            .map(|r| r.runtime_status)
    };
    assert_eq!(coder_status(&store), Some(RuntimeStatus::Idle));

    store.dispatch(Action::UpdatePhase {
        task_id: id.clone(),
        phase: PhaseType::Code,
        patch: PhasePatch::start(Utc::now()),
        at: Utc::now(),
    });
    store.dispatch(Action::UpdateAgent {
        id: "agent-coder".into(),
        patch: AgentPatch::working(id.clone()),
    });
    assert_eq!(coder_status(&store), Some(RuntimeStatus::Running));

    store.dispatch(Action::UpdatePhase {
        task_id: id.clone(),
        phase: PhaseType::Code,
        patch: PhasePatch::complete(Utc::now()),
        at: Utc::now(),
    });
    store.dispatch(Action::UpdateAgent {
        id: "agent-coder".into(),
        patch: AgentPatch::idle(),
    });
    assert_eq!(coder_status(&store), Some(RuntimeStatus::Done));
}

#[test]
fn subscribers_see_every_dispatch_in_order() {
    let (store, id) = seeded_store();
    let rx = store.subscribe();
    store.dispatch(Action::DeleteTask(id));
    store.dispatch(Action::ClearLogs(None));
    let names: Vec<&str> = rx.try_iter().map(|e| e.action).collect();
    assert_eq!(names, vec!["delete_task", "clear_logs"]);
}
