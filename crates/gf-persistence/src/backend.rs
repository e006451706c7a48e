//! The storage capability every persistence tier implements.

use async_trait::async_trait;
use gf_core::snapshot::{Snapshot, StoredSnapshot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote store returned {0}")]
    Status(u16),
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One storage tier: loads and saves the whole snapshot.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// The stored snapshot, or `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError>;

    async fn save(&self, stored: &StoredSnapshot) -> Result<(), PersistenceError>;
}
