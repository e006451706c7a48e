//! Bootstrap hydration and debounced autosave.

use std::sync::Arc;
use std::time::Duration;

use gf_core::action::Action;
use gf_core::snapshot::Snapshot;
use gf_core::store::Store;
use gf_telemetry::tracing_setup::operation_span;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::bridge::PersistenceBridge;

/// Load the first available snapshot into `store`. Live-work markers are
/// reset first, so a restored agent is never `working`. Returns `false` when
/// nothing was stored.
pub async fn hydrate(store: &Store, bridge: &PersistenceBridge) -> bool {
    let (span, _) = operation_span("hydrate");
    let loaded = bridge.load().instrument(span.clone()).await;
    let _entered = span.enter();
    match loaded {
        Some(snapshot) => {
            let tasks = snapshot.tasks.as_ref().map_or(0, Vec::len);
            store.dispatch(Action::Hydrate(snapshot.quiesce()));
            info!(tasks, "state hydrated");
            true
        }
        None => {
            debug!("no stored state, starting fresh");
            false
        }
    }
}

/// Save the current state unless a stream is open or an agent is working.
/// Returns `true` when a tier accepted the snapshot.
pub async fn save_if_idle(store: &Store, bridge: &PersistenceBridge) -> bool {
    let snapshot = store.read(|state| (!state.is_busy()).then(|| Snapshot::capture(state)));
    match snapshot {
        Some(snapshot) => bridge.save(snapshot).await.is_some(),
        None => {
            debug!("state busy, autosave deferred");
            false
        }
    }
}

/// Handle to a running autosave task.
pub struct Autosave {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Autosave {
    /// Stop the task, flushing pending changes first.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

/// Save the store after every burst of dispatches, once `debounce` passes
/// without a further change. Busy states are skipped; the dispatches that
/// end the busy period schedule the next save.
pub fn spawn_autosave(
    store: Arc<Store>,
    bridge: Arc<PersistenceBridge>,
    debounce: Duration,
) -> Autosave {
    let events = store.subscribe();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();

    let task = tokio::spawn(async move {
        loop {
            // Wait for the first change of a burst. A change queued before
            // shutdown still counts, so it is flushed below.
            tokio::select! {
                biased;
                event = events.recv_async() => {
                    if event.is_err() {
                        return;
                    }
                }
                _ = token.cancelled() => return,
            }

            // Quiet period: every further change restarts the window.
            let mut stopping = false;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        stopping = true;
                        break;
                    }
                    event = events.recv_async() => {
                        if event.is_err() {
                            stopping = true;
                            break;
                        }
                    }
                    _ = tokio::time::sleep(debounce) => break,
                }
            }

            let (span, _) = operation_span("autosave");
            save_if_idle(&store, &bridge).instrument(span).await;
            if stopping {
                return;
            }
        }
    });

    Autosave { shutdown, task }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
