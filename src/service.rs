/// Public read surface over the cache tiers
///
/// Wires the shared upstream client into aggregator, enricher and both
/// caches, and exposes the three read operations: top snapshot, recent
/// window, health. Cache failures that reach a reader are folded into a
/// single upstream-unavailable error so callers map them uniformly.
use crate::aggregator::SourceAggregator;
use crate::apis::MarketDataApi;
use crate::cache::recent::RecentWindowCache;
use crate::cache::snapshot::{SnapshotCache, SnapshotRead};
use crate::config::Config;
use crate::enricher::MetadataEnricher;
use crate::errors::RefreshError;
use crate::types::BubbleRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// One served snapshot: ranked records truncated to the caller's limit,
/// flagged when the data came from the stale zone or a fallback.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotView {
    pub records: Vec<BubbleRecord>,
    pub captured_at: DateTime<Utc>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub snapshot_records: usize,
    pub snapshot_age_ms: Option<u64>,
    pub snapshot_refreshes: u64,
    pub snapshot_failures: u64,
    pub last_refresh_attempt_at: Option<DateTime<Utc>>,
    pub recent_entries: usize,
    pub last_error: Option<String>,
}

pub struct BubbleService {
    snapshot: Arc<SnapshotCache>,
    recent: Arc<RecentWindowCache>,
    default_limit: usize,
    started_at: DateTime<Utc>,
}

impl BubbleService {
    pub fn new(api: Arc<dyn MarketDataApi>, config: &Config) -> Self {
        let aggregator = Arc::new(SourceAggregator::new(api.clone(), &config.sources));
        let enricher = Arc::new(MetadataEnricher::new(api, &config.enrichment));
        let snapshot = SnapshotCache::new(aggregator.clone(), enricher.clone(), &config.snapshot);
        let recent = RecentWindowCache::new(aggregator, enricher, &config.recent);
        Self {
            snapshot,
            recent,
            default_limit: config.snapshot.default_limit,
            started_at: Utc::now(),
        }
    }

    pub fn snapshot_cache(&self) -> Arc<SnapshotCache> {
        self.snapshot.clone()
    }

    pub fn recent_cache(&self) -> Arc<RecentWindowCache> {
        self.recent.clone()
    }

    /// The ranked top list, at most `limit` records (configured default
    /// when unspecified).
    pub async fn top_snapshot(&self, limit: Option<usize>) -> Result<SnapshotView, RefreshError> {
        let limit = limit.unwrap_or(self.default_limit).max(1);
        let read = self
            .snapshot
            .get(limit)
            .await
            .map_err(Self::unavailable)?;
        Ok(Self::view(read, limit))
    }

    /// The recent window, most recently sighted first.
    pub async fn recent_snapshot(
        &self,
        limit: Option<usize>,
    ) -> Result<SnapshotView, RefreshError> {
        let limit = limit.unwrap_or(self.default_limit).max(1);
        let read = self.recent.get().await.map_err(Self::unavailable)?;
        Ok(Self::view(read, limit))
    }

    pub fn health(&self) -> HealthView {
        let current = self.snapshot.current();
        let last_error = self
            .snapshot
            .last_error()
            .or_else(|| self.recent.last_error())
            .map(|e| e.to_string());
        HealthView {
            healthy: last_error.is_none(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            snapshot_records: current.as_ref().map(|s| s.records.len()).unwrap_or(0),
            snapshot_age_ms: current.as_ref().map(|s| s.age().as_millis() as u64),
            snapshot_refreshes: self.snapshot.refresh_count(),
            snapshot_failures: self.snapshot.failure_count(),
            last_refresh_attempt_at: self.snapshot.last_attempt_at(),
            recent_entries: self.recent.entry_count(),
            last_error,
        }
    }

    fn view(read: SnapshotRead, limit: usize) -> SnapshotView {
        let mut records = read.snapshot.records;
        records.truncate(limit);
        SnapshotView {
            records,
            captured_at: read.snapshot.captured_at,
            stale: read.stale,
        }
    }

    fn unavailable(err: RefreshError) -> RefreshError {
        match err {
            RefreshError::UpstreamUnavailable(_) => err,
            other => RefreshError::UpstreamUnavailable(other.to_string()),
        }
    }
}
