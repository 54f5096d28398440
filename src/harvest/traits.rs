//! Tiered collection framework.
//!
//! This module defines how a platform is harvested:
//! - Per-platform tier implementations via [`ChartSource`]
//! - The fallback chain and normalisation via [`TieredCollector`]
//!
//! Tiers run strictly in order (primary, secondary, mock). The first tier
//! that yields at least one entry wins; the others are never attempted.

use crate::config::StreamEstimate;
use crate::model::{harvest_timestamp, ChartEntry, PlatformSnapshot, Tier, Track};
use crate::traits::{CollectionError, Collector};
use async_trait::async_trait;
use std::num::NonZeroUsize;
use tracing::{debug, info, warn};

// ============================================================================
// Chart Source Trait
// ============================================================================

/// Platform-specific data acquisition, one method per tier.
///
/// Implementations only fetch and parse. `limit` is a request hint (API
/// page size); tiers return every row they parsed, in source order with
/// any source-reported rank. Ordering, truncation to the limit and stream
/// estimation happen in [`TieredCollector`].
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the orchestrator runs collectors
/// on separate tasks.
#[async_trait]
pub trait ChartSource: Send + Sync {
    /// Official API or feed.
    ///
    /// # Errors
    ///
    /// Fails on network errors, unparseable responses, or when the platform
    /// requires credentials that were not configured. Platforms without a
    /// public API return [`CollectionError::TierUnavailable`].
    async fn primary(&self, limit: usize) -> Result<Vec<ChartEntry>, CollectionError>;

    /// Public chart page.
    ///
    /// Should try structured extraction (embedded JSON) before falling back
    /// to CSS selectors.
    async fn secondary(&self, limit: usize) -> Result<Vec<ChartEntry>, CollectionError>;

    /// Fixed sample chart served by the mock tier.
    fn sample_chart(&self) -> &'static [SampleEntry];

    /// Mock tier. Only fails if the sample chart is empty.
    fn fallback(&self, limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        let sample = self.sample_chart();
        if sample.is_empty() {
            return Err(CollectionError::MockMisconfigured(
                "sample chart is empty".to_string(),
            ));
        }
        Ok(sample
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, s)| ChartEntry::new(s.title, s.artist).with_rank(i as u32 + 1))
            .collect())
    }
}

/// One row of a hardcoded sample chart.
#[derive(Debug, Clone, Copy)]
pub struct SampleEntry {
    pub title: &'static str,
    pub artist: &'static str,
}

/// Shorthand for sample chart tables.
pub const fn sample(title: &'static str, artist: &'static str) -> SampleEntry {
    SampleEntry { title, artist }
}

// ============================================================================
// Tiered Collector
// ============================================================================

/// Runs a [`ChartSource`] through its fallback chain and normalises the
/// winning tier's entries into a [`PlatformSnapshot`].
pub struct TieredCollector<S: ChartSource> {
    platform: String,
    display_name: String,
    source: S,
    streams: StreamEstimate,
}

impl<S: ChartSource> TieredCollector<S> {
    pub fn new(
        platform: impl Into<String>,
        display_name: impl Into<String>,
        source: S,
        streams: StreamEstimate,
    ) -> Self {
        Self {
            platform: platform.into(),
            display_name: display_name.into(),
            source,
            streams,
        }
    }

    fn fall_through(&self, tier: Tier, err: &CollectionError) {
        warn!(
            platform = %self.platform,
            tier = %tier,
            error = %err,
            "Tier failed, falling through"
        );
    }
}

fn require_entries(entries: Vec<ChartEntry>) -> Result<Vec<ChartEntry>, CollectionError> {
    if entries.is_empty() {
        Err(CollectionError::Empty)
    } else {
        Ok(entries)
    }
}

#[async_trait]
impl<S: ChartSource> Collector for TieredCollector<S> {
    fn platform_id(&self) -> &str {
        &self.platform
    }

    async fn collect(&self, limit: NonZeroUsize) -> Result<PlatformSnapshot, CollectionError> {
        let n = limit.get();

        let live = match self.source.primary(n).await.and_then(require_entries) {
            Ok(entries) => Ok((Tier::PrimaryApi, entries)),
            Err(err) => {
                self.fall_through(Tier::PrimaryApi, &err);
                self.source
                    .secondary(n)
                    .await
                    .and_then(require_entries)
                    .map(|entries| (Tier::SecondaryScrape, entries))
            }
        };

        let (tier, entries) = match live {
            Ok(found) => found,
            Err(err) => {
                self.fall_through(Tier::SecondaryScrape, &err);
                let entries = self.source.fallback(n).and_then(require_entries)?;
                warn!(platform = %self.platform, "Serving mock chart");
                (Tier::FallbackMock, entries)
            }
        };

        let tracks = normalise(&self.platform, entries, tier, n, &self.streams);
        info!(
            platform = %self.platform,
            tier = %tier,
            tracks = tracks.len(),
            "Collected chart"
        );

        Ok(PlatformSnapshot {
            platform: self.platform.clone(),
            display_name: self.display_name.clone(),
            retrieved_at: harvest_timestamp(),
            tier_used: tier,
            tracks,
        })
    }
}

/// Orders entries by source-reported rank (stable), keeps at most `limit`,
/// and re-ranks them contiguously from 1.
///
/// Source play counts are kept for live tiers; everything else gets the
/// rank-based estimate.
pub fn normalise(
    platform: &str,
    entries: Vec<ChartEntry>,
    tier: Tier,
    limit: usize,
    streams: &StreamEstimate,
) -> Vec<Track> {
    let mut ordered: Vec<(usize, ChartEntry)> = entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| (e.rank.map(|r| r as usize).unwrap_or(i + 1), e))
        .collect();
    ordered.sort_by_key(|(key, _)| *key);

    if ordered.len() > limit {
        debug!(platform, kept = limit, dropped = ordered.len() - limit, "Truncating chart");
    }

    ordered
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (_, entry))| {
            let rank = i as u32 + 1;
            let reported = entry.streams.filter(|_| !tier.is_mock());
            Track {
                title: non_blank(entry.title),
                artist: non_blank(entry.artist),
                platform: platform.to_string(),
                rank,
                estimated_streams: reported.unwrap_or_else(|| streams.for_rank(rank)),
                source_url: entry.source_url,
                weeks_on_chart: entry.weeks_on_chart,
            }
        })
        .collect()
}

fn non_blank(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

// ============================================================================
// Tests
// ============================================================================
