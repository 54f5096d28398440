//! SQLite-backed snapshot store.

use super::schema::{SCHEMA_V1, SCHEMA_VERSION};
use super::{SnapshotId, SnapshotStore, StorageError};
use crate::model::{PlatformSnapshot, Tier, Track};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, ToSql};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const SNAPSHOT_COLUMNS: &str = "id, platform, display_name, tier_used, retrieved_at_us";

#[derive(Clone)]
pub struct SqliteSnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotStore {
    /// Opens (or creates) the database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        info!(path = %path.display(), "Opened snapshot store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_V1)?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(StorageError::Corrupt(format!(
                "database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }
        if version < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64, StorageError> {
    i64::try_from(value)
        .map_err(|_| StorageError::Corrupt(format!("{} out of range: {}", what, value)))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

struct SnapshotRow {
    id: i64,
    platform: String,
    display_name: String,
    tier_used: String,
    retrieved_at_us: i64,
}

fn load_snapshots(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<PlatformSnapshot>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(SnapshotRow {
                id: row.get(0)?,
                platform: row.get(1)?,
                display_name: row.get(2)?,
                tier_used: row.get(3)?,
                retrieved_at_us: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(|row| hydrate(conn, row)).collect()
}

fn hydrate(conn: &Connection, row: SnapshotRow) -> Result<PlatformSnapshot, StorageError> {
    let tier_used: Tier = row.tier_used.parse().map_err(StorageError::Corrupt)?;
    let retrieved_at = DateTime::<Utc>::from_timestamp_micros(row.retrieved_at_us).ok_or_else(
        || StorageError::Corrupt(format!("invalid timestamp {}", row.retrieved_at_us)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT rank, title, artist, estimated_streams, source_url, weeks_on_chart
         FROM tracks
         WHERE snapshot_id = ?1
         ORDER BY rank ASC",
    )?;
    let tracks = stmt
        .query_map(params![row.id], |r| {
            let streams: i64 = r.get(3)?;
            Ok(Track {
                title: r.get(1)?,
                artist: r.get(2)?,
                platform: row.platform.clone(),
                rank: r.get(0)?,
                estimated_streams: streams.max(0) as u64,
                source_url: r.get(4)?,
                weeks_on_chart: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PlatformSnapshot {
        platform: row.platform,
        display_name: row.display_name,
        retrieved_at,
        tier_used,
        tracks,
    })
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&self, snapshot: &PlatformSnapshot) -> Result<SnapshotId, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO platform_snapshots (platform, display_name, tier_used, retrieved_at_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.platform,
                snapshot.display_name,
                snapshot.tier_used.as_str(),
                snapshot.retrieved_at.timestamp_micros(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StorageError::Conflict {
                    platform: snapshot.platform.clone(),
                    retrieved_at: snapshot.retrieved_at,
                })
            }
            Err(e) => return Err(e.into()),
        }
        let snapshot_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO tracks
                 (snapshot_id, rank, title, artist, estimated_streams, source_url, weeks_on_chart)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for track in &snapshot.tracks {
                stmt.execute(params![
                    snapshot_id,
                    track.rank,
                    track.title,
                    track.artist,
                    to_i64(track.estimated_streams, "estimated_streams")?,
                    track.source_url,
                    track.weeks_on_chart,
                ])?;
            }
        }

        // Dropping `tx` without commit rolls everything back.
        tx.commit()?;
        debug!(
            platform = %snapshot.platform,
            snapshot_id,
            tracks = snapshot.tracks.len(),
            "Saved snapshot"
        );
        Ok(snapshot_id)
    }

    fn recent(
        &self,
        platform_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: NonZeroUsize,
    ) -> Result<Vec<PlatformSnapshot>, StorageError> {
        let conn = self.lock()?;
        let since_us = since.map(|ts| ts.timestamp_micros());
        let limit = to_i64(limit.get() as u64, "limit")?;
        load_snapshots(
            &conn,
            &format!(
                "SELECT {} FROM platform_snapshots
                 WHERE (?1 IS NULL OR platform = ?1)
                   AND (?2 IS NULL OR retrieved_at_us >= ?2)
                 ORDER BY retrieved_at_us DESC, id DESC
                 LIMIT ?3",
                SNAPSHOT_COLUMNS
            ),
            &[&platform_id, &since_us, &limit],
        )
    }

    fn history(
        &self,
        platform_id: &str,
        limit: NonZeroUsize,
    ) -> Result<Vec<PlatformSnapshot>, StorageError> {
        self.recent(Some(platform_id), None, limit)
    }

    fn latest_per_platform(&self) -> Result<Vec<PlatformSnapshot>, StorageError> {
        let conn = self.lock()?;
        load_snapshots(
            &conn,
            "SELECT s.id, s.platform, s.display_name, s.tier_used, s.retrieved_at_us
             FROM platform_snapshots s
             JOIN (
                 SELECT platform, MAX(retrieved_at_us) AS latest
                 FROM platform_snapshots
                 GROUP BY platform
             ) m ON s.platform = m.platform AND s.retrieved_at_us = m.latest
             ORDER BY s.platform ASC",
            &[],
        )
    }
}
