//! Flat key-value tier: a JSON object on disk mapping keys to documents.
//! The snapshot lives under [`SNAPSHOT_KEY`]; other keys are preserved.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gf_core::snapshot::{Snapshot, StoredSnapshot};
use serde_json::{Map, Value};

use crate::backend::{PersistenceError, SnapshotBackend};

pub const SNAPSHOT_KEY: &str = "ghostflow:persistence:snapshot";

pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<Map<String, Value>, PersistenceError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if data.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&data)?)
    }
}

#[async_trait]
impl SnapshotBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let mut map = self.read_map().await?;
        match map.remove(SNAPSHOT_KEY) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(StoredSnapshot::unwrap_value(value)?)),
        }
    }

    async fn save(&self, stored: &StoredSnapshot) -> Result<(), PersistenceError> {
        // A corrupt file is replaced rather than blocking every future save.
        let mut map = self.read_map().await.unwrap_or_default();
        map.insert(SNAPSHOT_KEY.to_string(), serde_json::to_value(stored)?);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&map)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::state::UiState;

    fn stored() -> StoredSnapshot {
        StoredSnapshot::new(Snapshot {
            ui: Some(UiState {
                active_task_id: Some("task-1".into()),
                active_project_id: None,
            }),
            ..Snapshot::default()
        })
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("state.json"));
        assert!(backend.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv").join("state.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"other:key": 42}"#).unwrap();

        let backend = FileBackend::new(&path);
        let snap = stored();
        backend.save(&snap).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), Some(snap.snapshot));

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["other:key"], 42);
        assert!(raw[SNAPSHOT_KEY]["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn corrupt_file_fails_load_but_not_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let backend = FileBackend::new(&path);
        assert!(matches!(backend.load().await, Err(PersistenceError::Serde(_))));
        backend.save(&stored()).await.unwrap();
        assert!(backend.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bare_snapshot_value_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            format!(r#"{{"{SNAPSHOT_KEY}": {{"ui": {{"activeTaskId": "t"}}}}}}"#),
        )
        .unwrap();
        let loaded = FileBackend::new(&path).load().await.unwrap().unwrap();
        assert_eq!(loaded.ui.unwrap().active_task_id.as_deref(), Some("t"));
    }
}
