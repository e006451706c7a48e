//! Snapshot persistence for the GhostFlow store.
//!
//! Three tiers share the [`SnapshotBackend`] capability: a remote HTTP
//! document, a SQLite database and a flat key-value JSON file. The
//! [`PersistenceBridge`] walks them in that order.

pub mod autosave;
pub mod backend;
pub mod bridge;
pub mod file;
pub mod remote;
pub mod sqlite;

pub use autosave::{hydrate, save_if_idle, spawn_autosave, Autosave};
pub use backend::{PersistenceError, SnapshotBackend};
pub use bridge::PersistenceBridge;
pub use file::FileBackend;
pub use remote::RemoteBackend;
pub use sqlite::SqliteBackend;
