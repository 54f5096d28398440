//! CSV export of the aggregated chart.

use crate::model::PlatformSnapshot;
use chrono::SecondsFormat;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Column order of the export.
pub const HEADER: [&str; 6] = [
    "rank",
    "title",
    "artist",
    "estimated_streams",
    "platform",
    "retrieved_at",
];

#[derive(Serialize)]
struct ExportRow<'a> {
    rank: u32,
    title: &'a str,
    artist: &'a str,
    estimated_streams: u64,
    platform: &'a str,
    retrieved_at: String,
}

/// Writes one row per track of every snapshot, platforms in the given
/// order and tracks by rank. Returns the number of rows written.
pub fn write_csv<W: Write>(
    snapshots: &[PlatformSnapshot],
    writer: W,
) -> Result<usize, ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(HEADER)?;

    let mut rows = 0;
    for snapshot in snapshots {
        let retrieved_at = snapshot
            .retrieved_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        for track in &snapshot.tracks {
            wtr.serialize(ExportRow {
                rank: track.rank,
                title: &track.title,
                artist: &track.artist,
                estimated_streams: track.estimated_streams,
                platform: &snapshot.platform,
                retrieved_at: retrieved_at.clone(),
            })?;
            rows += 1;
        }
    }
    wtr.flush()?;
    Ok(rows)
}

pub fn to_csv_string(snapshots: &[PlatformSnapshot]) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_csv(snapshots, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn write_csv_file(snapshots: &[PlatformSnapshot], path: &Path) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_csv(snapshots, File::create(path)?)
}
