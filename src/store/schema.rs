//! Database schema for the snapshot store.

/// Bumped whenever `SCHEMA_V1` gains a successor.
pub const SCHEMA_VERSION: i64 = 1;

/// One row per (platform, harvest) and one row per track, foreign-keyed to
/// its snapshot. `retrieved_at_us` is microseconds since the Unix epoch.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS platform_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    display_name TEXT NOT NULL,
    tier_used TEXT NOT NULL,
    retrieved_at_us INTEGER NOT NULL,
    UNIQUE (platform, retrieved_at_us)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_retrieved
    ON platform_snapshots (retrieved_at_us);

CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL REFERENCES platform_snapshots (id),
    rank INTEGER NOT NULL CHECK (rank >= 1),
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    estimated_streams INTEGER NOT NULL CHECK (estimated_streams >= 0),
    source_url TEXT,
    weeks_on_chart INTEGER,
    UNIQUE (snapshot_id, rank)
);

CREATE INDEX IF NOT EXISTS idx_tracks_snapshot ON tracks (snapshot_id);
"#;
