use crate::harvest::registry::CollectorDescriptor;
use crate::model::PlatformSnapshot;
use crate::store::StorageError;
use crate::traits::CollectionError;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// Why a platform produced no snapshot in a harvest cycle.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Collection failed: {0}")]
    Collection(#[from] CollectionError),
    #[error("Collector timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("Collector task aborted: {0}")]
    Aborted(String),
}

/// Runs collectors under a shared concurrency bound, each with its own
/// deadline.
///
/// One executor is built per harvest cycle, so permits never leak between
/// cycles.
pub struct CollectorExecutor {
    semaphore: Arc<Semaphore>,
    deadline: Duration,
}

impl CollectorExecutor {
    pub fn new(concurrency_limit: NonZeroUsize, deadline: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.get())),
            deadline,
        }
    }

    /// Collects one platform.
    ///
    /// The deadline starts once a permit is held. On expiry the collector
    /// task is aborted and its late result, if any, is discarded.
    #[instrument(skip(self, descriptor), fields(platform = %descriptor.platform_id))]
    pub async fn execute(
        &self,
        descriptor: &CollectorDescriptor,
        limit: NonZeroUsize,
    ) -> Result<PlatformSnapshot, PlatformError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| PlatformError::Aborted(format!("Semaphore error: {}", e)))?;

        info!("Starting collection for platform: {}", descriptor.platform_id);

        let collector = Arc::clone(&descriptor.collector);
        let mut handle = tokio::spawn(async move { collector.collect(limit).await });

        let result = match timeout(self.deadline, &mut handle).await {
            Ok(Ok(collected)) => collected.map_err(PlatformError::from),
            Ok(Err(join_err)) => Err(PlatformError::Aborted(join_err.to_string())),
            Err(_) => {
                handle.abort();
                warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Collector exceeded deadline, abandoning"
                );
                Err(PlatformError::Timeout(self.deadline))
            }
        };

        info!("Finished collection for platform: {}", descriptor.platform_id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{harvest_timestamp, Tier};
    use crate::traits::Collector;
    use async_trait::async_trait;

    struct SlowCollector {
        delay: Duration,
        panic: bool,
    }

    #[async_trait]
    impl Collector for SlowCollector {
        fn platform_id(&self) -> &str {
            "slow"
        }

        async fn collect(&self, _limit: NonZeroUsize) -> Result<PlatformSnapshot, CollectionError> {
            tokio::time::sleep(self.delay).await;
            if self.panic {
                panic!("collector bug");
            }
            Ok(PlatformSnapshot {
                platform: "slow".into(),
                display_name: "Slow".into(),
                retrieved_at: harvest_timestamp(),
                tier_used: Tier::PrimaryApi,
                tracks: vec![],
            })
        }
    }

    fn descriptor(delay: Duration, panic: bool) -> CollectorDescriptor {
        CollectorDescriptor {
            platform_id: "slow".into(),
            display_name: "Slow".into(),
            homepage_url: "https://slow.example".into(),
            description: String::new(),
            requires_authentication: false,
            rate_limit_per_minute: 60,
            collector: Arc::new(SlowCollector { delay, panic }),
        }
    }

    fn one() -> NonZeroUsize {
        NonZeroUsize::new(1).unwrap()
    }

    #[tokio::test]
    async fn test_execute_within_deadline() {
        let executor = CollectorExecutor::new(one(), Duration::from_secs(1));
        let result = executor
            .execute(&descriptor(Duration::from_millis(5), false), one())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let executor = CollectorExecutor::new(one(), Duration::from_millis(20));
        let result = executor
            .execute(&descriptor(Duration::from_secs(10), false), one())
            .await;
        assert!(matches!(result, Err(PlatformError::Timeout(d)) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_panicking_collector_is_contained() {
        let executor = CollectorExecutor::new(one(), Duration::from_secs(1));
        let result = executor
            .execute(&descriptor(Duration::from_millis(1), true), one())
            .await;
        assert!(matches!(result, Err(PlatformError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_permit_released_after_timeout() {
        let executor = CollectorExecutor::new(one(), Duration::from_millis(10));
        let _ = executor
            .execute(&descriptor(Duration::from_secs(10), false), one())
            .await;
        let result = executor
            .execute(&descriptor(Duration::from_millis(1), false), one())
            .await;
        assert!(result.is_ok());
    }
}
