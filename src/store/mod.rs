//! Snapshot persistence.
//!
//! Append-only storage of [`PlatformSnapshot`]s. The public contract has no
//! update or delete; a correction is simply a newer snapshot.

mod schema;
mod sqlite;

pub use sqlite::SqliteSnapshotStore;

use crate::model::PlatformSnapshot;
use chrono::{DateTime, Utc};
use std::num::NonZeroUsize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot for '{platform}' at {retrieved_at} already exists")]
    Conflict {
        platform: String,
        retrieved_at: DateTime<Utc>,
    },

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Opaque row id of a saved snapshot.
pub type SnapshotId = i64;

/// Durable snapshot history.
///
/// Implementations must accept concurrent `save` calls for distinct
/// platforms; each call is atomic (header and tracks land together or not
/// at all).
pub trait SnapshotStore: Send + Sync {
    /// Appends one snapshot with all of its tracks.
    fn save(&self, snapshot: &PlatformSnapshot) -> Result<SnapshotId, StorageError>;

    /// Newest snapshots first, optionally restricted to one platform and to
    /// snapshots retrieved at or after `since`.
    fn recent(
        &self,
        platform_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: NonZeroUsize,
    ) -> Result<Vec<PlatformSnapshot>, StorageError>;

    /// Snapshots of one platform ordered by `retrieved_at` descending.
    fn history(
        &self,
        platform_id: &str,
        limit: NonZeroUsize,
    ) -> Result<Vec<PlatformSnapshot>, StorageError>;

    /// The newest snapshot of every platform that has one.
    fn latest_per_platform(&self) -> Result<Vec<PlatformSnapshot>, StorageError>;
}
