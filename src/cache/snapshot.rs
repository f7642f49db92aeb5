/// Top-list snapshot cache
///
/// Holds the latest published snapshot and decides, per read, whether to
/// serve it as-is, serve it stale while refreshing in the background, or
/// block the caller on a refresh. Refreshes run single-flight; a failed
/// refresh degrades to the previous snapshot when one exists.
use crate::aggregator::SourceAggregator;
use crate::cache::{classify, FlightTicket, Freshness, RefreshOutcome, SingleFlight};
use crate::config::SnapshotConfig;
use crate::enricher::MetadataEnricher;
use crate::errors::RefreshError;
use crate::logger::{self, LogTag};
use crate::types::SnapshotState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// A snapshot handed to a reader, flagged when served from the stale zone
/// or as a fallback after a failed refresh.
#[derive(Debug, Clone)]
pub struct SnapshotRead {
    pub snapshot: SnapshotState,
    pub stale: bool,
}

pub struct SnapshotCache {
    aggregator: Arc<SourceAggregator>,
    enricher: Arc<MetadataEnricher>,
    config: SnapshotConfig,
    state: RwLock<Option<SnapshotState>>,
    flight: Arc<SingleFlight<RefreshOutcome>>,
    last_error: Mutex<Option<RefreshError>>,
    last_attempt_at: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
    refreshes: AtomicU64,
    failures: AtomicU64,
}

impl SnapshotCache {
    pub fn new(
        aggregator: Arc<SourceAggregator>,
        enricher: Arc<MetadataEnricher>,
        config: &SnapshotConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            aggregator,
            enricher,
            config: config.clone(),
            state: RwLock::new(None),
            flight: SingleFlight::new(),
            last_error: Mutex::new(None),
            last_attempt_at: Mutex::new(None),
            refreshes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    fn fresh_ttl(&self) -> Duration {
        Duration::from_secs(self.config.fresh_ttl_secs)
    }

    fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.config.stale_ttl_secs)
    }

    /// Read the snapshot for a caller that wants `limit` records.
    ///
    /// Fresh and deep enough: served as-is. Stale: served immediately with
    /// the stale flag while a background refresh runs. Expired, absent, or
    /// too shallow for `limit`: the caller waits on a refresh. When that
    /// refresh fails, the previous snapshot (if any) is served stale rather
    /// than surfacing the error.
    pub async fn get(self: &Arc<Self>, limit: usize) -> Result<SnapshotRead, RefreshError> {
        let limit = limit.max(1);
        let current = self.state.read().unwrap().clone();
        if let Some(state) = current {
            // A snapshot shallower than the caller needs counts as expired
            // whatever its age
            if state.records.len() >= limit {
                match classify(state.age(), self.fresh_ttl(), self.stale_ttl()) {
                    Freshness::Fresh => {
                        return Ok(SnapshotRead {
                            snapshot: state,
                            stale: false,
                        });
                    }
                    Freshness::Stale => {
                        self.spawn_refresh(limit);
                        return Ok(SnapshotRead {
                            snapshot: state,
                            stale: true,
                        });
                    }
                    Freshness::Expired => {}
                }
            }
        }

        match self.refresh(limit).await.as_ref() {
            Ok(state) => Ok(SnapshotRead {
                snapshot: state.clone(),
                stale: false,
            }),
            Err(err) => match self.state.read().unwrap().clone() {
                Some(prior) => Ok(SnapshotRead {
                    snapshot: prior,
                    stale: true,
                }),
                None => Err(err.clone()),
            },
        }
    }

    /// Fire a refresh without waiting for it. Joins any in-flight refresh,
    /// so repeated stale reads cost one upstream cycle.
    pub fn spawn_refresh(self: &Arc<Self>, limit: usize) {
        let cache = self.clone();
        tokio::spawn(async move {
            let _ = cache.refresh(limit).await;
        });
    }

    /// Run one refresh cycle, or join the one already in flight.
    pub async fn refresh(self: &Arc<Self>, limit: usize) -> Arc<RefreshOutcome> {
        match self.flight.begin() {
            FlightTicket::Leader(publisher) => {
                let outcome = Arc::new(self.perform_refresh(limit).await);
                publisher.publish(outcome.clone());
                outcome
            }
            FlightTicket::Follower(receiver) => match SingleFlight::wait(receiver).await {
                Some(outcome) => outcome,
                None => Arc::new(Err(RefreshError::UpstreamUnavailable(
                    "refresh aborted before completing".to_string(),
                ))),
            },
        }
    }

    /// Refresh sized by the configured default, for scheduled cycles.
    pub async fn refresh_default(self: &Arc<Self>) -> Arc<RefreshOutcome> {
        self.refresh(self.config.default_limit).await
    }

    async fn perform_refresh(&self, limit: usize) -> RefreshOutcome {
        let started = Instant::now();
        *self.last_attempt_at.lock().unwrap() = Some(chrono::Utc::now());
        // A deep caller widens the fetch; a shallow one never narrows it
        let fetch_limit = limit.max(self.config.default_limit);
        match self.aggregator.collect(fetch_limit).await {
            Ok(records) => {
                let metadata = self.enricher.enrich(&records).await;
                let state = SnapshotState::assemble(&records, &metadata);
                let count = state.records.len();
                *self.state.write().unwrap() = Some(state.clone());
                *self.last_error.lock().unwrap() = None;
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                logger::info(
                    LogTag::Cache,
                    &format!(
                        "Snapshot refreshed: {} records in {}ms",
                        count,
                        started.elapsed().as_millis()
                    ),
                );
                Ok(state)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock().unwrap() = Some(err.clone());
                logger::warning(
                    LogTag::Cache,
                    &format!(
                        "Snapshot refresh failed after {}ms: {}",
                        started.elapsed().as_millis(),
                        err
                    ),
                );
                Err(err)
            }
        }
    }

    pub fn current(&self) -> Option<SnapshotState> {
        self.state.read().unwrap().clone()
    }

    pub fn last_error(&self) -> Option<RefreshError> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn last_attempt_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        *self.last_attempt_at.lock().unwrap()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::mock::{listing, MockMarketData};
    use crate::config::{EnrichmentConfig, FeedConfig, SourcesConfig};
    use futures::future::join_all;
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn single_feed_sources() -> SourcesConfig {
        SourcesConfig {
            feeds: vec![FeedConfig {
                name: "top".to_string(),
                path: "token-boosts/top/v1".to_string(),
                weighted: true,
            }],
            blacklist: vec![],
            chains: vec![],
        }
    }

    fn cache_with(
        mock: Arc<MockMarketData>,
        fresh_ttl_secs: u64,
        stale_ttl_secs: u64,
    ) -> Arc<SnapshotCache> {
        let aggregator = Arc::new(SourceAggregator::new(
            mock.clone(),
            &single_feed_sources(),
        ));
        let enricher = Arc::new(MetadataEnricher::new(mock, &EnrichmentConfig::default()));
        SnapshotCache::new(
            aggregator,
            enricher,
            &SnapshotConfig {
                fresh_ttl_secs,
                stale_ttl_secs,
                default_limit: 100,
            },
        )
    }

    fn seed_feed(mock: &MockMarketData, addrs: &[&str]) {
        mock.set_feed(
            "top",
            Ok(addrs
                .iter()
                .map(|a| listing("solana", a, "top", 1.0))
                .collect()),
        );
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_upstream() {
        let mock = Arc::new(MockMarketData::new());
        seed_feed(&mock, &["t1", "t2"]);
        let cache = cache_with(mock.clone(), 60, 120);

        let first = cache.get(2).await.unwrap();
        assert!(!first.stale);
        assert_eq!(first.snapshot.records.len(), 2);
        assert_eq!(first.snapshot.records[0].rank, 1);

        let second = cache.get(2).await.unwrap();
        assert!(!second.stale);
        assert_eq!(mock.listing_calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_expired_reads_collapse_to_one_refresh() {
        let mock = Arc::new(MockMarketData::new());
        seed_feed(&mock, &["t1"]);
        mock.set_listing_delay(Duration::from_millis(50));
        let cache = cache_with(mock.clone(), 60, 120);

        let reads = join_all((0..8).map(|_| {
            let cache = cache.clone();
            async move { cache.get(1).await }
        }))
        .await;

        for read in reads {
            let read = read.unwrap();
            assert!(!read.stale);
            assert_eq!(read.snapshot.records.len(), 1);
        }
        assert_eq!(mock.listing_calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_reads_serve_immediately_with_one_background_refresh() {
        let mock = Arc::new(MockMarketData::new());
        seed_feed(&mock, &["t1"]);
        // fresh_ttl 0: any measurable age lands in the stale zone
        let cache = cache_with(mock.clone(), 0, 3600);

        cache.get(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        mock.set_listing_delay(Duration::from_millis(100));

        for _ in 0..10 {
            let read = cache.get(1).await.unwrap();
            assert!(read.stale);
            assert_eq!(read.snapshot.records.len(), 1);
        }

        // Let the background flight land; all ten reads shared it
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(mock.listing_calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_prior_snapshot() {
        let mock = Arc::new(MockMarketData::new());
        seed_feed(&mock, &["t1", "t2"]);
        let cache = cache_with(mock.clone(), 0, 0);

        cache.get(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        mock.set_feed(
            "top",
            Err(crate::errors::ApiError::Timeout {
                endpoint: "token-boosts/top/v1".to_string(),
                timeout_ms: 10_000,
            }),
        );

        let read = cache.get(2).await.unwrap();
        assert!(read.stale);
        assert_eq!(read.snapshot.records.len(), 2);
        assert!(cache.last_error().is_some());
        assert_eq!(cache.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_with_no_prior_data_propagates() {
        let mock = Arc::new(MockMarketData::new());
        mock.set_feed(
            "top",
            Err(crate::errors::ApiError::Status {
                endpoint: "token-boosts/top/v1".to_string(),
                status: 503,
            }),
        );
        let cache = cache_with(mock, 30, 120);

        match cache.get(5).await {
            Err(RefreshError::PrimarySource { source, .. }) => assert_eq!(source, "top"),
            other => panic!("expected primary source failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shallow_fresh_snapshot_refetches_for_deeper_caller() {
        let mock = Arc::new(MockMarketData::new());
        seed_feed(&mock, &["t1", "t2", "t3"]);
        let cache = cache_with(mock.clone(), 60, 120);

        let shallow = cache.get(2).await.unwrap();
        // default_limit 100 already widened the fetch, so the deep read
        // is satisfied without another upstream cycle
        assert_eq!(shallow.snapshot.records.len(), 3);
        let deep = cache.get(3).await.unwrap();
        assert_eq!(deep.snapshot.records.len(), 3);
        assert_eq!(mock.listing_calls.load(AtomicOrdering::SeqCst), 1);
    }
}
