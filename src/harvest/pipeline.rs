//! Harvest orchestration.
//!
//! One harvest cycle fans out over the selected platforms, runs each
//! collector through a [`CollectorExecutor`] (concurrency bound plus
//! deadline), persists every snapshot and gathers per-platform failures.
//! A cycle never fails as a whole once started; only an empty registry is
//! an error.

use crate::config::{ConfigurationError, HarvestSettings};
use crate::executor::{CollectorExecutor, PlatformError};
use crate::harvest::registry::{CollectorDescriptor, CollectorRegistry};
use crate::model::PlatformSnapshot;
use crate::store::{SnapshotStore, StorageError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Request
// ============================================================================

/// Parameters of one harvest cycle.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    /// Platforms to harvest; `None` means every registered platform.
    pub platform_filter: Option<BTreeSet<String>>,
    pub limit: NonZeroUsize,
    pub per_platform_timeout: Duration,
    pub max_concurrency: NonZeroUsize,
}

impl Default for HarvestRequest {
    fn default() -> Self {
        Self {
            platform_filter: None,
            limit: NonZeroUsize::new(20).unwrap_or(NonZeroUsize::MIN),
            per_platform_timeout: Duration::from_secs(30),
            max_concurrency: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl HarvestRequest {
    pub fn from_settings(settings: &HarvestSettings) -> Result<Self, ConfigurationError> {
        let positive = |field: &str, value: usize| {
            NonZeroUsize::new(value).ok_or_else(|| ConfigurationError::InvalidValue {
                field: field.to_string(),
                reason: "must be at least 1".to_string(),
            })
        };
        Ok(Self {
            platform_filter: None,
            limit: positive("harvest.limit", settings.limit)?,
            per_platform_timeout: settings.per_platform_timeout(),
            max_concurrency: positive("harvest.max_concurrency", settings.max_concurrency)?,
        })
    }

    pub fn with_filter<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platform_filter = Some(platforms.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limit(mut self, limit: NonZeroUsize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_platform_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, max_concurrency: NonZeroUsize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

// ============================================================================
// Result
// ============================================================================

/// Everything one harvest cycle produced.
///
/// `succeeded` is in completion order, which is not meaningful; use each
/// snapshot's `platform`.
#[derive(Debug, Default)]
pub struct HarvestResult {
    pub succeeded: Vec<PlatformSnapshot>,
    pub failed: BTreeMap<String, PlatformError>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestOutcome {
    /// Every targeted platform produced a snapshot
    Complete,
    /// Some platforms failed
    Partial,
    /// Nothing was harvested
    Failed,
}

/// Counts-only view of a [`HarvestResult`] for callers that trigger a
/// harvest and do not need the tracks.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub outcome: HarvestOutcome,
    pub succeeded: usize,
    pub failed: usize,
    pub mock_snapshots: usize,
    pub tracks: usize,
    pub platforms: Vec<String>,
    pub failures: BTreeMap<String, String>,
    pub duration_ms: u64,
}

impl HarvestResult {
    pub fn outcome(&self) -> HarvestOutcome {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (true, _) => HarvestOutcome::Failed,
            (false, true) => HarvestOutcome::Complete,
            (false, false) => HarvestOutcome::Partial,
        }
    }

    pub fn summary(&self) -> HarvestSummary {
        let mut platforms: Vec<String> =
            self.succeeded.iter().map(|s| s.platform.clone()).collect();
        platforms.sort();

        HarvestSummary {
            outcome: self.outcome(),
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
            mock_snapshots: self.succeeded.iter().filter(|s| s.is_mock()).count(),
            tracks: self.succeeded.iter().map(|s| s.tracks.len()).sum(),
            platforms,
            failures: self
                .failed
                .iter()
                .map(|(platform, err)| (platform.clone(), err.to_string()))
                .collect(),
            duration_ms: self.duration_ms,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs harvest cycles over a registry and persists into a store.
///
/// Cheap to share: cycles hold no state on the orchestrator, so concurrent
/// calls to [`run_harvest`](Self::run_harvest) are independent.
pub struct HarvestOrchestrator {
    registry: Arc<CollectorRegistry>,
    store: Arc<dyn SnapshotStore>,
}

impl HarvestOrchestrator {
    pub fn new(registry: Arc<CollectorRegistry>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    /// Filter ∩ registry, or the whole registry. Unknown ids are ignored.
    fn resolve_targets(&self, filter: Option<&BTreeSet<String>>) -> Vec<CollectorDescriptor> {
        match filter {
            None => self.registry.list().into_iter().cloned().collect(),
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    let found = self.registry.get(id);
                    if found.is_none() {
                        warn!(platform = %id, "Requested platform is not registered, ignoring");
                    }
                    found.cloned()
                })
                .collect(),
        }
    }

    /// Runs one harvest cycle.
    ///
    /// Each platform is collected under `max_concurrency` and
    /// `per_platform_timeout`, then saved. Collection, timeout and storage
    /// failures are recorded per platform and never stop the others.
    ///
    /// # Errors
    ///
    /// Only [`ConfigurationError::EmptyRegistry`]; everything else is
    /// reported inside the [`HarvestResult`].
    #[instrument(skip(self, request), fields(limit = request.limit.get()))]
    pub async fn run_harvest(
        &self,
        request: &HarvestRequest,
    ) -> Result<HarvestResult, ConfigurationError> {
        if self.registry.is_empty() {
            return Err(ConfigurationError::EmptyRegistry);
        }

        let start = Instant::now();
        let targets = self.resolve_targets(request.platform_filter.as_ref());
        info!(
            platforms = targets.len(),
            max_concurrency = request.max_concurrency.get(),
            timeout_ms = request.per_platform_timeout.as_millis() as u64,
            "Starting harvest cycle"
        );

        let executor = Arc::new(CollectorExecutor::new(
            request.max_concurrency,
            request.per_platform_timeout,
        ));
        let mut pending: BTreeSet<String> =
            targets.iter().map(|d| d.platform_id.clone()).collect();

        let mut tasks = JoinSet::new();
        for descriptor in targets {
            let executor = Arc::clone(&executor);
            let store = Arc::clone(&self.store);
            let limit = request.limit;
            tasks.spawn(async move {
                let outcome = harvest_platform(&executor, store, &descriptor, limit).await;
                (descriptor.platform_id, outcome)
            });
        }

        let mut result = HarvestResult::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((platform, Ok(snapshot))) => {
                    pending.remove(&platform);
                    result.succeeded.push(snapshot);
                }
                Ok((platform, Err(err))) => {
                    pending.remove(&platform);
                    warn!(platform = %platform, error = %err, "Platform failed");
                    result.failed.insert(platform, err);
                }
                Err(join_err) => {
                    error!(error = %join_err, "Harvest task ended abnormally");
                }
            }
        }

        // Only reachable if a task itself panicked outside the executor.
        for platform in pending {
            result.failed.insert(
                platform,
                PlatformError::Aborted("harvest task ended without a result".to_string()),
            );
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            duration_ms = result.duration_ms,
            "Harvest cycle finished"
        );
        Ok(result)
    }
}

/// Collects and saves one platform. The store write happens after the
/// concurrency permit is released and outside the deadline.
async fn harvest_platform(
    executor: &CollectorExecutor,
    store: Arc<dyn SnapshotStore>,
    descriptor: &CollectorDescriptor,
    limit: NonZeroUsize,
) -> Result<PlatformSnapshot, PlatformError> {
    let snapshot = executor.execute(descriptor, limit).await?;
    if snapshot.is_mock() {
        warn!(platform = %snapshot.platform, "Persisting mock-tier snapshot");
    }

    let (id, snapshot) = tokio::task::spawn_blocking(move || {
        store.save(&snapshot).map(|id| (id, snapshot))
    })
    .await
    .map_err(|e| StorageError::Task(e.to_string()))??;

    debug!(
        platform = %snapshot.platform,
        snapshot_id = id,
        tracks = snapshot.tracks.len(),
        "Snapshot saved"
    );
    Ok(snapshot)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamEstimate;
    use crate::harvest::traits::{ChartSource, SampleEntry, TieredCollector};
    use crate::model::{harvest_timestamp, ChartEntry, Tier, Track};
    use crate::store::{SnapshotId, SqliteSnapshotStore};
    use crate::traits::{CollectionError, Collector};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    /// Answers after `delay` with a fixed three-track chart.
    struct DelayedCollector {
        platform: String,
        delay: Duration,
    }

    #[async_trait]
    impl Collector for DelayedCollector {
        fn platform_id(&self) -> &str {
            &self.platform
        }

        async fn collect(&self, limit: NonZeroUsize) -> Result<PlatformSnapshot, CollectionError> {
            tokio::time::sleep(self.delay).await;
            let tracks = (1..=3u32)
                .take(limit.get())
                .map(|rank| Track {
                    title: format!("Song {}", rank),
                    artist: "Artist".into(),
                    platform: self.platform.clone(),
                    rank,
                    estimated_streams: 1000 * u64::from(4 - rank),
                    source_url: None,
                    weeks_on_chart: None,
                })
                .collect();
            Ok(PlatformSnapshot {
                platform: self.platform.clone(),
                display_name: self.platform.to_uppercase(),
                retrieved_at: harvest_timestamp(),
                tier_used: Tier::PrimaryApi,
                tracks,
            })
        }
    }

    /// Every tier fails, including an empty sample chart.
    struct BrokenSource;

    #[async_trait]
    impl ChartSource for BrokenSource {
        async fn primary(&self, _limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
            Err(CollectionError::Network("unreachable".into()))
        }

        async fn secondary(&self, _limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
            Err(CollectionError::MarkerNotFound("table".into()))
        }

        fn sample_chart(&self) -> &'static [SampleEntry] {
            &[]
        }
    }

    struct RejectingStore;

    impl SnapshotStore for RejectingStore {
        fn save(&self, _snapshot: &PlatformSnapshot) -> Result<SnapshotId, StorageError> {
            Err(StorageError::Corrupt("disk full".into()))
        }

        fn recent(
            &self,
            _platform_id: Option<&str>,
            _since: Option<DateTime<Utc>>,
            _limit: NonZeroUsize,
        ) -> Result<Vec<PlatformSnapshot>, StorageError> {
            Ok(vec![])
        }

        fn history(
            &self,
            _platform_id: &str,
            _limit: NonZeroUsize,
        ) -> Result<Vec<PlatformSnapshot>, StorageError> {
            Ok(vec![])
        }

        fn latest_per_platform(&self) -> Result<Vec<PlatformSnapshot>, StorageError> {
            Ok(vec![])
        }
    }

    fn descriptor(platform: &str, collector: Arc<dyn Collector>) -> CollectorDescriptor {
        CollectorDescriptor {
            platform_id: platform.to_string(),
            display_name: platform.to_uppercase(),
            homepage_url: format!("https://{}.example", platform),
            description: String::new(),
            requires_authentication: false,
            rate_limit_per_minute: 60,
            collector,
        }
    }

    fn delayed(platform: &str, delay: Duration) -> CollectorDescriptor {
        descriptor(
            platform,
            Arc::new(DelayedCollector {
                platform: platform.to_string(),
                delay,
            }),
        )
    }

    fn registry(descriptors: Vec<CollectorDescriptor>) -> Arc<CollectorRegistry> {
        let mut registry = CollectorRegistry::new();
        for d in descriptors {
            registry.register(d).unwrap();
        }
        Arc::new(registry)
    }

    fn memory_store() -> Arc<SqliteSnapshotStore> {
        Arc::new(SqliteSnapshotStore::open_in_memory().unwrap())
    }

    fn quick_platforms(ids: &[&str]) -> Vec<CollectorDescriptor> {
        ids.iter()
            .map(|id| delayed(id, Duration::from_millis(5)))
            .collect()
    }

    fn request() -> HarvestRequest {
        HarvestRequest::default()
            .with_limit(NonZeroUsize::new(10).unwrap())
            .with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let mut platforms = quick_platforms(&["a", "b", "d", "e"]);
        platforms.push(descriptor(
            "c",
            Arc::new(TieredCollector::new(
                "c",
                "C",
                BrokenSource,
                StreamEstimate::default(),
            )),
        ));
        let orchestrator = HarvestOrchestrator::new(registry(platforms), memory_store());

        let result = orchestrator.run_harvest(&request()).await.unwrap();

        let mut succeeded: Vec<&str> = result
            .succeeded
            .iter()
            .map(|s| s.platform.as_str())
            .collect();
        succeeded.sort();
        assert_eq!(succeeded, vec!["a", "b", "d", "e"]);
        assert_eq!(result.failed.len(), 1);
        assert!(matches!(
            result.failed.get("c"),
            Some(PlatformError::Collection(CollectionError::MockMisconfigured(_)))
        ));
        assert_eq!(result.outcome(), HarvestOutcome::Partial);
    }

    #[tokio::test]
    async fn test_repeated_cycles_append_snapshots() {
        let store = memory_store();
        let orchestrator =
            HarvestOrchestrator::new(registry(quick_platforms(&["a", "b"])), store.clone());

        let first = orchestrator.run_harvest(&request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = orchestrator.run_harvest(&request()).await.unwrap();
        assert_eq!(first.outcome(), HarvestOutcome::Complete);
        assert_eq!(second.outcome(), HarvestOutcome::Complete);

        let history = store.history("a", NonZeroUsize::new(2).unwrap()).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].retrieved_at > history[1].retrieved_at);

        let newest = second.succeeded.iter().find(|s| s.platform == "a").unwrap();
        assert_eq!(&history[0], newest);
    }

    #[tokio::test]
    async fn test_concurrency_is_capped() {
        let platforms = ["p1", "p2", "p3", "p4", "p5"]
            .iter()
            .map(|id| delayed(id, Duration::from_millis(100)))
            .collect();
        let orchestrator = HarvestOrchestrator::new(registry(platforms), memory_store());

        let start = Instant::now();
        let result = orchestrator
            .run_harvest(&request().with_concurrency(NonZeroUsize::new(2).unwrap()))
            .await
            .unwrap();

        assert_eq!(result.succeeded.len(), 5);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_hanging_collector_times_out_alone() {
        let mut platforms = quick_platforms(&["fast1", "fast2"]);
        platforms.push(delayed("hang", Duration::from_secs(3600)));
        let orchestrator = HarvestOrchestrator::new(registry(platforms), memory_store());

        let start = Instant::now();
        let result = orchestrator
            .run_harvest(&request().with_timeout(Duration::from_millis(50)))
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            result.failed.get("hang"),
            Some(PlatformError::Timeout(d)) if *d == Duration::from_millis(50)
        ));
        assert_eq!(result.succeeded.len(), 2);
        assert!(result.succeeded.iter().all(|s| s.tracks.len() == 3));
    }

    #[tokio::test]
    async fn test_empty_registry_is_configuration_error() {
        let orchestrator =
            HarvestOrchestrator::new(Arc::new(CollectorRegistry::new()), memory_store());
        assert!(matches!(
            orchestrator.run_harvest(&request()).await,
            Err(ConfigurationError::EmptyRegistry)
        ));
    }

    #[tokio::test]
    async fn test_filter_selects_registered_platforms() {
        let store = memory_store();
        let orchestrator =
            HarvestOrchestrator::new(registry(quick_platforms(&["a", "b", "c"])), store.clone());

        let result = orchestrator
            .run_harvest(&request().with_filter(["b", "nope"]))
            .await
            .unwrap();

        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.succeeded[0].platform, "b");
        assert!(result.failed.is_empty());
        assert!(store.history("a", NonZeroUsize::MIN).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_per_platform() {
        let orchestrator = HarvestOrchestrator::new(
            registry(quick_platforms(&["a", "b"])),
            Arc::new(RejectingStore),
        );

        let result = orchestrator.run_harvest(&request()).await.unwrap();

        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed.len(), 2);
        assert!(result
            .failed
            .values()
            .all(|e| matches!(e, PlatformError::Storage(_))));
        assert_eq!(result.outcome(), HarvestOutcome::Failed);
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let orchestrator =
            HarvestOrchestrator::new(registry(quick_platforms(&["b", "a"])), memory_store());
        let summary = orchestrator
            .run_harvest(&request().with_limit(NonZeroUsize::new(2).unwrap()))
            .await
            .unwrap()
            .summary();

        assert_eq!(summary.outcome, HarvestOutcome::Complete);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.tracks, 4);
        assert_eq!(summary.platforms, vec!["a", "b"]);
        assert_eq!(summary.mock_snapshots, 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["outcome"], "complete");
    }

    #[test]
    fn test_request_from_settings_rejects_zero_limit() {
        let settings = HarvestSettings {
            limit: 0,
            ..HarvestSettings::default()
        };
        assert!(HarvestRequest::from_settings(&settings).is_err());

        let request = HarvestRequest::from_settings(&HarvestSettings::default()).unwrap();
        assert_eq!(request.limit.get(), 20);
        assert_eq!(request.max_concurrency.get(), 4);
    }
}
