/// Background refresh scheduler
///
/// Drives both cache tiers on a fixed interval so readers mostly hit fresh
/// data, and honors the shared shutdown flag between interval slices rather
/// than sleeping through it.
use crate::cache::recent::RecentWindowCache;
use crate::cache::snapshot::SnapshotCache;
use crate::config::SchedulerConfig;
use crate::logger::{self, LogTag};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct RefreshScheduler {
    snapshot: Arc<SnapshotCache>,
    recent: Arc<RecentWindowCache>,
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
}

impl RefreshScheduler {
    pub fn new(
        snapshot: Arc<SnapshotCache>,
        recent: Arc<RecentWindowCache>,
        config: &SchedulerConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            snapshot,
            recent,
            config: config.clone(),
            shutdown,
        }
    }

    /// Spawn the refresh loop; returns `None` when scheduling is disabled
    /// and the caches run purely read-triggered.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            logger::info(LogTag::Scheduler, "Scheduler disabled, caches refresh on read");
            return None;
        }
        Some(tokio::spawn(async move { self.run().await }))
    }

    async fn run(self) {
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        logger::info(
            LogTag::Scheduler,
            &format!("Refresh loop started ({}s interval)", interval.as_secs()),
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            // Refresh errors are already recorded by the caches; the loop
            // just keeps the cadence
            let _ = self.snapshot.refresh_default().await;
            let _ = self.recent.refresh().await;

            let mut slept = Duration::ZERO;
            while slept < interval {
                if self.shutdown.load(Ordering::SeqCst) {
                    logger::info(LogTag::Scheduler, "Refresh loop stopped");
                    return;
                }
                let slice = Duration::from_millis(250).min(interval - slept);
                tokio::time::sleep(slice).await;
                slept += slice;
            }
        }
        logger::info(LogTag::Scheduler, "Refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SourceAggregator;
    use crate::apis::mock::{listing, MockMarketData};
    use crate::config::{EnrichmentConfig, FeedConfig, RecentConfig, SnapshotConfig, SourcesConfig};
    use crate::enricher::MetadataEnricher;
    use std::sync::atomic::Ordering as AtomicOrdering;

    #[tokio::test]
    async fn test_scheduler_refreshes_both_tiers_and_stops_on_shutdown() {
        let mock = Arc::new(MockMarketData::new());
        mock.set_feed("top", Ok(vec![listing("solana", "t1", "top", 1.0)]));

        let sources = SourcesConfig {
            feeds: vec![FeedConfig {
                name: "top".to_string(),
                path: "token-boosts/top/v1".to_string(),
                weighted: true,
            }],
            blacklist: vec![],
            chains: vec![],
        };
        let aggregator = Arc::new(SourceAggregator::new(mock.clone(), &sources));
        let enricher = Arc::new(MetadataEnricher::new(
            mock.clone(),
            &EnrichmentConfig::default(),
        ));
        let snapshot = SnapshotCache::new(
            aggregator.clone(),
            enricher.clone(),
            &SnapshotConfig::default(),
        );
        let recent = RecentWindowCache::new(aggregator, enricher, &RecentConfig::default());

        let shutdown = Arc::new(AtomicBool::new(false));
        let scheduler = RefreshScheduler::new(
            snapshot.clone(),
            recent.clone(),
            &SchedulerConfig {
                enabled: true,
                interval_secs: 60,
            },
            shutdown.clone(),
        );
        let handle = scheduler.spawn().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        // One cycle: a listing fetch per tier
        assert_eq!(mock.listing_calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(snapshot.refresh_count(), 1);
        assert_eq!(recent.refresh_count(), 1);

        shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();
        assert_eq!(mock.listing_calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_spawns_nothing() {
        let mock = Arc::new(MockMarketData::new());
        let sources = SourcesConfig::default();
        let aggregator = Arc::new(SourceAggregator::new(mock.clone(), &sources));
        let enricher = Arc::new(MetadataEnricher::new(mock, &EnrichmentConfig::default()));
        let snapshot = SnapshotCache::new(
            aggregator.clone(),
            enricher.clone(),
            &SnapshotConfig::default(),
        );
        let recent = RecentWindowCache::new(aggregator, enricher, &RecentConfig::default());

        let scheduler = RefreshScheduler::new(
            snapshot,
            recent,
            &SchedulerConfig {
                enabled: false,
                interval_secs: 30,
            },
            Arc::new(AtomicBool::new(false)),
        );
        assert!(scheduler.spawn().is_none());
    }
}
