use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::action::Action;
use crate::phase_map::PhaseAgentMap;
use crate::reducer::reduce;
use crate::registry::{build_registry, missing_mapped_roles, placeholder_agent, RegistryAgent};
use crate::state::AppState;

/// Notification sent to subscribers after every dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub revision: u64,
    pub action: &'static str,
}

/// Owner of the canonical [`AppState`].
///
/// All mutation goes through [`Store::dispatch`], which serializes actions
/// behind a write lock and runs them through the pure reducer. Readers get
/// cloned snapshots or run a closure under the read lock.
pub struct Store {
    state: RwLock<AppState>,
    phase_map: PhaseAgentMap,
    revision: AtomicU64,
    subscribers: Mutex<Vec<flume::Sender<StoreEvent>>>,
}

impl Store {
    /// Wrap `initial`, registering an agent for every mapped role that has
    /// none.
    pub fn new(initial: AppState, phase_map: PhaseAgentMap) -> Self {
        let state = ensure_mapped_agents(initial, &phase_map);
        Self {
            state: RwLock::new(state),
            phase_map,
            revision: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn phase_map(&self) -> &PhaseAgentMap {
        &self.phase_map
    }

    /// Apply `action` and notify subscribers. Returns the new revision.
    pub fn dispatch(&self, action: Action) -> u64 {
        let name = action.name();
        let hydrating = matches!(action, Action::Hydrate(_));
        {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let current = std::mem::take(&mut *guard);
            let mut next = reduce(current, action);
            if hydrating {
                next = ensure_mapped_agents(next, &self.phase_map);
            }
            *guard = next;
        }
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(action = name, revision, "dispatched");
        self.publish(StoreEvent {
            revision,
            action: name,
        });
        revision
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> AppState {
        self.read(|s| s.clone())
    }

    /// Run `f` against the current state under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Derived agent view, recomputed from the current state.
    pub fn registry(&self) -> Vec<RegistryAgent> {
        self.read(|s| build_registry(s, &self.phase_map))
    }

    /// Receive a [`StoreEvent`] for every dispatch from now on.
    pub fn subscribe(&self) -> flume::Receiver<StoreEvent> {
        let (tx, rx) = flume::unbounded();
        let mut senders = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        senders.push(tx);
        rx
    }

    fn publish(&self, event: StoreEvent) {
        let mut senders = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| tx.send(event).is_ok());
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(AppState::default(), PhaseAgentMap::default())
    }
}

fn ensure_mapped_agents(mut state: AppState, map: &PhaseAgentMap) -> AppState {
    for role in missing_mapped_roles(&state.agents, map) {
        state.agents.push(placeholder_agent(role, true));
    }
    state
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
