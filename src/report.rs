//! Read-side aggregation over stored snapshots.
//!
//! Mock-tier snapshots carry illustrative numbers only, so every
//! aggregate takes a [`MockPolicy`] and reports how much mock data went
//! into it.

use crate::economics::{self, EconomicImpact, EconomicParameters};
use crate::model::PlatformSnapshot;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Whether `FALLBACK_MOCK` snapshots count towards aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MockPolicy {
    #[default]
    Include,
    Exclude,
}

impl MockPolicy {
    pub fn admits(&self, snapshot: &PlatformSnapshot) -> bool {
        match self {
            MockPolicy::Include => true,
            MockPolicy::Exclude => !snapshot.is_mock(),
        }
    }
}

impl FromStr for MockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "include" => Ok(MockPolicy::Include),
            "exclude" => Ok(MockPolicy::Exclude),
            other => Err(format!("unknown mock policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamTotals {
    pub total_streams: u64,
    pub snapshots: usize,
    /// Mock snapshots that were counted
    pub mock_snapshots: usize,
    /// Mock snapshots left out by [`MockPolicy::Exclude`]
    pub excluded_snapshots: usize,
    pub by_platform: BTreeMap<String, u64>,
}

impl StreamTotals {
    /// True when any counted number came from the mock tier.
    pub fn is_degraded(&self) -> bool {
        self.mock_snapshots > 0
    }
}

pub fn aggregate_streams(snapshots: &[PlatformSnapshot], policy: MockPolicy) -> StreamTotals {
    let mut totals = StreamTotals::default();
    for snapshot in snapshots {
        if !policy.admits(snapshot) {
            totals.excluded_snapshots += 1;
            continue;
        }
        let streams = snapshot.total_streams();
        totals.snapshots += 1;
        if snapshot.is_mock() {
            totals.mock_snapshots += 1;
        }
        totals.total_streams = totals.total_streams.saturating_add(streams);
        let platform = totals
            .by_platform
            .entry(snapshot.platform.clone())
            .or_default();
        *platform = platform.saturating_add(streams);
    }
    totals
}

/// One artist's standing across the counted snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistStanding {
    pub artist: String,
    pub total_streams: u64,
    pub tracks: usize,
    pub best_rank: u32,
    pub average_rank: f64,
    pub platforms: BTreeSet<String>,
}

/// Artists ordered by total streams (descending, ties by name), at most
/// `limit` of them.
pub fn top_artists(
    snapshots: &[PlatformSnapshot],
    policy: MockPolicy,
    limit: usize,
) -> Vec<ArtistStanding> {
    struct Tally {
        streams: u64,
        tracks: usize,
        best_rank: u32,
        rank_sum: u64,
        platforms: BTreeSet<String>,
    }

    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
    for track in snapshots
        .iter()
        .filter(|s| policy.admits(s))
        .flat_map(|s| &s.tracks)
    {
        let tally = tallies.entry(track.artist.as_str()).or_insert(Tally {
            streams: 0,
            tracks: 0,
            best_rank: u32::MAX,
            rank_sum: 0,
            platforms: BTreeSet::new(),
        });
        tally.streams = tally.streams.saturating_add(track.estimated_streams);
        tally.tracks += 1;
        tally.best_rank = tally.best_rank.min(track.rank);
        tally.rank_sum += u64::from(track.rank);
        tally.platforms.insert(track.platform.clone());
    }

    let mut standings: Vec<ArtistStanding> = tallies
        .into_iter()
        .map(|(artist, t)| ArtistStanding {
            artist: artist.to_string(),
            total_streams: t.streams,
            tracks: t.tracks,
            best_rank: t.best_rank,
            average_rank: t.rank_sum as f64 / t.tracks as f64,
            platforms: t.platforms,
        })
        .collect();
    // stable sort keeps name order for equal totals
    standings.sort_by(|a, b| b.total_streams.cmp(&a.total_streams));
    standings.truncate(limit);
    standings
}

/// Aggregates plus the economic indicators derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub policy: MockPolicy,
    pub totals: StreamTotals,
    pub impact: EconomicImpact,
    pub degraded: bool,
}

pub fn kpi_report(
    snapshots: &[PlatformSnapshot],
    policy: MockPolicy,
    params: &EconomicParameters,
) -> KpiReport {
    let totals = aggregate_streams(snapshots, policy);
    let impact = economics::compute(totals.total_streams, params);
    KpiReport {
        policy,
        degraded: totals.is_degraded(),
        totals,
        impact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{harvest_timestamp, Tier, Track};

    fn snapshot(platform: &str, tier: Tier, rows: &[(&str, u64)]) -> PlatformSnapshot {
        PlatformSnapshot {
            platform: platform.to_string(),
            display_name: platform.to_uppercase(),
            retrieved_at: harvest_timestamp(),
            tier_used: tier,
            tracks: rows
                .iter()
                .enumerate()
                .map(|(i, (artist, streams))| Track {
                    title: format!("Track {}", i + 1),
                    artist: artist.to_string(),
                    platform: platform.to_string(),
                    rank: i as u32 + 1,
                    estimated_streams: *streams,
                    source_url: None,
                    weeks_on_chart: None,
                })
                .collect(),
        }
    }

    fn fixture() -> Vec<PlatformSnapshot> {
        vec![
            snapshot("deezer", Tier::PrimaryApi, &[("Rema", 600_000), ("Tems", 400_000)]),
            snapshot("boomplay", Tier::FallbackMock, &[("Asake", 900_000), ("Rema", 100_000)]),
        ]
    }

    #[test]
    fn test_aggregate_with_mock_included() {
        let totals = aggregate_streams(&fixture(), MockPolicy::Include);
        assert_eq!(totals.total_streams, 2_000_000);
        assert_eq!(totals.snapshots, 2);
        assert_eq!(totals.mock_snapshots, 1);
        assert!(totals.is_degraded());
        assert_eq!(totals.by_platform["boomplay"], 1_000_000);
    }

    #[test]
    fn test_aggregate_with_mock_excluded() {
        let totals = aggregate_streams(&fixture(), MockPolicy::Exclude);
        assert_eq!(totals.total_streams, 1_000_000);
        assert_eq!(totals.excluded_snapshots, 1);
        assert!(!totals.is_degraded());
        assert!(!totals.by_platform.contains_key("boomplay"));
    }

    #[test]
    fn test_top_artists() {
        let standings = top_artists(&fixture(), MockPolicy::Include, 10);
        assert_eq!(standings[0].artist, "Asake");
        let rema = standings.iter().find(|s| s.artist == "Rema").unwrap();
        assert_eq!(rema.total_streams, 700_000);
        assert_eq!(rema.tracks, 2);
        assert_eq!(rema.best_rank, 1);
        assert!((rema.average_rank - 1.5).abs() < f64::EPSILON);
        assert_eq!(rema.platforms.len(), 2);

        let real_only = top_artists(&fixture(), MockPolicy::Exclude, 1);
        assert_eq!(real_only.len(), 1);
        assert_eq!(real_only[0].artist, "Rema");
    }

    #[test]
    fn test_kpi_report_uses_economic_model() {
        let report = kpi_report(&fixture(), MockPolicy::Exclude, &EconomicParameters::default());
        assert_eq!(report.impact, economics::compute(1_000_000, &EconomicParameters::default()));
        assert!(!report.degraded);
    }

    #[test]
    fn test_empty_input_is_zero() {
        let report = kpi_report(&[], MockPolicy::Include, &EconomicParameters::default());
        assert_eq!(report.totals.total_streams, 0);
        assert_eq!(report.impact.revenue, 0.0);
        assert!(top_artists(&[], MockPolicy::Include, 5).is_empty());
    }

    #[test]
    fn test_mock_policy_from_str() {
        assert_eq!("EXCLUDE".parse::<MockPolicy>().unwrap(), MockPolicy::Exclude);
        assert!("sometimes".parse::<MockPolicy>().is_err());
    }
}
