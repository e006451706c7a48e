use std::path::Path;

use async_trait::async_trait;
use gf_core::snapshot::{Snapshot, StoredSnapshot};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::backend::{PersistenceError, SnapshotBackend};

const SNAPSHOT_KEY: &str = "latest";

/// Structured local tier: one row per snapshot key in a SQLite database.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let conn = Connection::open(path.as_ref()).await?;
        let backend = Self { conn };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// In-memory database (useful for tests).
    pub async fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().await?;
        let backend = Self { conn };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<(), PersistenceError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS snapshots (
                        key        TEXT PRIMARY KEY,
                        payload    TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    );
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let payload: Option<String> = self
            .conn
            .call(|conn| {
                let row = conn
                    .query_row(
                        "SELECT payload FROM snapshots WHERE key = ?1",
                        rusqlite::params![SNAPSHOT_KEY],
                        |r| r.get(0),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        match payload {
            Some(json) => {
                let value: serde_json::Value = serde_json::from_str(&json)?;
                Ok(Some(StoredSnapshot::unwrap_value(value)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, stored: &StoredSnapshot) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(stored)?;
        let updated_at = stored.updated_at.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO snapshots (key, payload, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET payload = excluded.payload,
                                                    updated_at = excluded.updated_at",
                    rusqlite::params![SNAPSHOT_KEY, payload, updated_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::types::{Project, Task};

    fn snapshot(title: &str) -> StoredSnapshot {
        let project = Project::new("demo", Some("/repo".into()));
        StoredSnapshot::new(Snapshot {
            tasks: Some(vec![Task::new(title, &project.id)]),
            projects: Some(vec![project]),
            ..Snapshot::default()
        })
    }

    #[tokio::test]
    async fn empty_database_loads_nothing() {
        let db = SqliteBackend::open_in_memory().await.unwrap();
        assert!(db.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_latest() {
        let db = SqliteBackend::open_in_memory().await.unwrap();
        db.save(&snapshot("first")).await.unwrap();
        let second = snapshot("second");
        db.save(&second).await.unwrap();
        let loaded = db.load().await.unwrap().unwrap();
        assert_eq!(loaded, second.snapshot);
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let stored = snapshot("kept");
        SqliteBackend::open(&path).await.unwrap().save(&stored).await.unwrap();

        let reopened = SqliteBackend::open(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(stored.snapshot));
    }
}
