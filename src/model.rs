use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Acquisition strategy that produced a snapshot.
///
/// Serialized in upper snake case so mock data is never mistaken for a
/// genuine result once it leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Official API or feed
    PrimaryApi,
    /// Public HTML page
    SecondaryScrape,
    /// Hardcoded sample chart
    FallbackMock,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::PrimaryApi => "PRIMARY_API",
            Tier::SecondaryScrape => "SECONDARY_SCRAPE",
            Tier::FallbackMock => "FALLBACK_MOCK",
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Tier::FallbackMock)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRIMARY_API" => Ok(Tier::PrimaryApi),
            "SECONDARY_SCRAPE" => Ok(Tier::SecondaryScrape),
            "FALLBACK_MOCK" => Ok(Tier::FallbackMock),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// One ranked entry within a platform snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub platform: String, // registry id, e.g. "deezer"
    pub rank: u32,        // 1-based, strictly increasing within a snapshot
    pub estimated_streams: u64,
    pub source_url: Option<String>,
    pub weeks_on_chart: Option<u32>,
}

/// Immutable result of harvesting one platform once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    pub platform: String,
    pub display_name: String,
    pub retrieved_at: DateTime<Utc>,
    pub tier_used: Tier,
    pub tracks: Vec<Track>,
}

impl PlatformSnapshot {
    /// Sum of `estimated_streams` over all tracks.
    pub fn total_streams(&self) -> u64 {
        self.tracks
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.estimated_streams))
    }

    pub fn is_mock(&self) -> bool {
        self.tier_used.is_mock()
    }
}

/// Current time at storage precision (microseconds).
pub fn harvest_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Raw chart row as a collector tier reads it, before normalisation.
///
/// Every field except the title is optional because sources disagree on
/// what they expose; `rank` and `streams` are kept only when the source
/// actually reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartEntry {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub rank: Option<u32>,
    pub streams: Option<u64>,
    pub source_url: Option<String>,
    pub weeks_on_chart: Option<u32>,
}

impl ChartEntry {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            artist: Some(artist.into()),
            ..Default::default()
        }
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }
}
