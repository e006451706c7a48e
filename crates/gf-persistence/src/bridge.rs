//! Layered persistence over an ordered list of [`SnapshotBackend`]s.
//!
//! Saves go to the first backend that accepts them; loads return the first
//! non-empty snapshot. Backend errors are logged and skipped, so total
//! failure only means the application runs without persistence.

use std::sync::Arc;

use gf_core::config::PersistenceConfig;
use gf_core::snapshot::{Snapshot, StoredSnapshot};
use tracing::{debug, info, warn};

use crate::backend::SnapshotBackend;
use crate::file::FileBackend;
use crate::remote::RemoteBackend;
use crate::sqlite::SqliteBackend;

#[derive(Default)]
pub struct PersistenceBridge {
    backends: Vec<Arc<dyn SnapshotBackend>>,
}

impl PersistenceBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tier. Tiers are tried in insertion order.
    pub fn with_backend(mut self, backend: Arc<dyn SnapshotBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Remote (when configured), then SQLite, then the key-value file. A
    /// database that cannot be opened is left out of the chain.
    pub async fn from_config(config: &PersistenceConfig) -> Self {
        let mut bridge = Self::new();
        if let Some(url) = config.remote_url.as_deref().filter(|u| !u.trim().is_empty()) {
            bridge = bridge.with_backend(Arc::new(RemoteBackend::new(url)));
        }
        let db_path = config.database_path();
        match SqliteBackend::open(&db_path).await {
            Ok(db) => bridge = bridge.with_backend(Arc::new(db)),
            Err(e) => warn!(path = %db_path.display(), error = %e, "sqlite tier unavailable"),
        }
        bridge.with_backend(Arc::new(FileBackend::new(config.kv_path())))
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Save to the first tier that accepts the snapshot and return its name.
    /// Never fails; `None` means no tier accepted it.
    pub async fn save(&self, snapshot: Snapshot) -> Option<&str> {
        let stored = StoredSnapshot::new(snapshot);
        for backend in &self.backends {
            match backend.save(&stored).await {
                Ok(()) => {
                    debug!(backend = backend.name(), "snapshot saved");
                    return Some(backend.name());
                }
                Err(e) => warn!(backend = backend.name(), error = %e, "snapshot save failed"),
            }
        }
        warn!("no persistence tier accepted the snapshot");
        None
    }

    /// The first non-empty snapshot found, probing tiers in order.
    pub async fn load(&self) -> Option<Snapshot> {
        for backend in &self.backends {
            match backend.load().await {
                Ok(Some(snapshot)) if !snapshot.is_empty() => {
                    info!(backend = backend.name(), "snapshot loaded");
                    return Some(snapshot);
                }
                Ok(_) => debug!(backend = backend.name(), "no snapshot stored"),
                Err(e) => warn!(backend = backend.name(), error = %e, "snapshot load failed"),
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PersistenceError;
    use async_trait::async_trait;
    use gf_core::state::UiState;
    use std::sync::Mutex;

    /// In-memory tier that can be told to fail.
    #[derive(Default)]
    struct MemoryBackend {
        name: &'static str,
        fail: bool,
        stored: Mutex<Option<Snapshot>>,
    }

    impl MemoryBackend {
        fn named(name: &'static str) -> Self {
            Self {
                name,
                ..Self::default()
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SnapshotBackend for MemoryBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
            if self.fail {
                return Err(PersistenceError::Status(503));
            }
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn save(&self, stored: &StoredSnapshot) -> Result<(), PersistenceError> {
            if self.fail {
                return Err(PersistenceError::Status(503));
            }
            *self.stored.lock().unwrap() = Some(stored.snapshot.clone());
            Ok(())
        }
    }

    fn snap(task: &str) -> Snapshot {
        Snapshot {
            ui: Some(UiState {
                active_task_id: Some(task.into()),
                active_project_id: None,
            }),
            ..Snapshot::default()
        }
    }

    #[tokio::test]
    async fn save_stops_at_first_success() {
        let first = Arc::new(MemoryBackend::failing("remote"));
        let second = Arc::new(MemoryBackend::named("sqlite"));
        let third = Arc::new(MemoryBackend::named("file"));
        let bridge = PersistenceBridge::new()
            .with_backend(first)
            .with_backend(second.clone())
            .with_backend(third.clone());

        assert_eq!(bridge.save(snap("a")).await, Some("sqlite"));
        assert!(second.stored.lock().unwrap().is_some());
        assert!(third.stored.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn total_failure_is_silent() {
        let bridge = PersistenceBridge::new()
            .with_backend(Arc::new(MemoryBackend::failing("a")))
            .with_backend(Arc::new(MemoryBackend::failing("b")));
        assert_eq!(bridge.save(snap("a")).await, None);
        assert_eq!(bridge.load().await, None);
    }

    #[tokio::test]
    async fn load_skips_empty_and_failing_tiers() {
        let empty = Arc::new(MemoryBackend::named("sqlite"));
        *empty.stored.lock().unwrap() = Some(Snapshot::default());
        let full = Arc::new(MemoryBackend::named("file"));
        *full.stored.lock().unwrap() = Some(snap("from-file"));

        let bridge = PersistenceBridge::new()
            .with_backend(Arc::new(MemoryBackend::failing("remote")))
            .with_backend(empty)
            .with_backend(full);
        let loaded = bridge.load().await.unwrap();
        assert_eq!(loaded.ui.unwrap().active_task_id.as_deref(), Some("from-file"));
    }

    #[tokio::test]
    async fn config_chain_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = PersistenceConfig {
            remote_url: Some("http://127.0.0.1:1/state".into()),
            database_path: dir.path().join("state.db").display().to_string(),
            kv_path: dir.path().join("state.json").display().to_string(),
            debounce_ms: 10,
        };
        let bridge = PersistenceBridge::from_config(&config).await;
        assert_eq!(bridge.backend_names(), vec!["remote", "sqlite", "file"]);

        let no_remote = PersistenceConfig {
            remote_url: None,
            ..config
        };
        let bridge = PersistenceBridge::from_config(&no_remote).await;
        assert_eq!(bridge.backend_names(), vec!["sqlite", "file"]);
    }
}
