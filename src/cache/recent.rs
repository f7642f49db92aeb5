/// Recent-window cache
///
/// A bounded registry of every token observed in the listing feeds lately,
/// surviving its drop from the top list until retention or capacity evicts
/// it. Each refresh observes a wider slice than the top snapshot publishes,
/// updates sightings in place, and republishes the window ordered by most
/// recent sighting. Metadata accumulated for an entry is never regressed by
/// a later, emptier enrichment pass.
use crate::aggregator::SourceAggregator;
use crate::cache::snapshot::SnapshotRead;
use crate::cache::{classify, FlightTicket, Freshness, RefreshOutcome, SingleFlight};
use crate::config::RecentConfig;
use crate::enricher::MetadataEnricher;
use crate::errors::RefreshError;
use crate::logger::{self, LogTag};
use crate::types::{BubbleRecord, RecentEntry, SnapshotState, TokenIdentity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

pub struct RecentWindowCache {
    aggregator: Arc<SourceAggregator>,
    enricher: Arc<MetadataEnricher>,
    config: RecentConfig,
    registry: Mutex<HashMap<TokenIdentity, RecentEntry>>,
    published: RwLock<Option<SnapshotState>>,
    flight: Arc<SingleFlight<RefreshOutcome>>,
    last_error: Mutex<Option<RefreshError>>,
    refreshes: AtomicU64,
    failures: AtomicU64,
}

impl RecentWindowCache {
    pub fn new(
        aggregator: Arc<SourceAggregator>,
        enricher: Arc<MetadataEnricher>,
        config: &RecentConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            aggregator,
            enricher,
            config: config.clone(),
            registry: Mutex::new(HashMap::new()),
            published: RwLock::new(None),
            flight: SingleFlight::new(),
            last_error: Mutex::new(None),
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

    /// Read the published window, same zone rules as the top snapshot:
    /// fresh serves as-is, stale serves immediately under a background
    /// refresh, expired blocks on one, failure degrades to the prior view.
    pub async fn get(self: &Arc<Self>) -> Result<SnapshotRead, RefreshError> {
        let current = self.published.read().unwrap().clone();
        if let Some(state) = current {
            match classify(state.age(), self.fresh_ttl(), self.stale_ttl()) {
                Freshness::Fresh => {
                    return Ok(SnapshotRead {
                        snapshot: state,
                        stale: false,
                    });
                }
                Freshness::Stale => {
                    self.spawn_refresh();
                    return Ok(SnapshotRead {
                        snapshot: state,
                        stale: true,
                    });
                }
                Freshness::Expired => {}
            }
        }

        match self.refresh().await.as_ref() {
            Ok(state) => Ok(SnapshotRead {
                snapshot: state.clone(),
                stale: false,
            }),
            Err(err) => match self.published.read().unwrap().clone() {
                Some(prior) => Ok(SnapshotRead {
                    snapshot: prior,
                    stale: true,
                }),
                None => Err(err.clone()),
            },
        }
    }

    pub fn spawn_refresh(self: &Arc<Self>) {
        let cache = self.clone();
        tokio::spawn(async move {
            let _ = cache.refresh().await;
        });
    }

    /// Run one observation cycle, or join the one already in flight.
    pub async fn refresh(self: &Arc<Self>) -> Arc<RefreshOutcome> {
        match self.flight.begin() {
            FlightTicket::Leader(publisher) => {
                let outcome = Arc::new(self.perform_refresh().await);
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

    async fn perform_refresh(&self) -> RefreshOutcome {
        let started = Instant::now();
        let records = match self.aggregator.collect(self.config.observe_limit).await {
            Ok(records) => records,
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock().unwrap() = Some(err.clone());
                logger::warning(
                    LogTag::Cache,
                    &format!("Recent-window observation failed: {}", err),
                );
                return Err(err);
            }
        };
        let metadata = self.enricher.enrich(&records).await;
        let now = Utc::now();

        let (state, evicted) = {
            let mut registry = self.registry.lock().unwrap();
            for record in records {
                let observed = metadata
                    .get(&record.identity)
                    .cloned()
                    .unwrap_or_default();
                match registry.get_mut(&record.identity) {
                    Some(entry) => {
                        entry.last_record = record;
                        entry.last_seen_at = now;
                        // Overlay, never replace: a pass that resolved less
                        // must not erase what earlier sightings resolved
                        entry.metadata.overlay(&observed);
                    }
                    None => {
                        registry.insert(
                            record.identity.clone(),
                            RecentEntry {
                                last_record: record,
                                last_seen_at: now,
                                metadata: observed,
                            },
                        );
                    }
                }
            }
            let evicted = Self::evict(
                &mut registry,
                now,
                chrono::Duration::hours(self.config.retention_hours as i64),
                self.config.capacity,
            );
            (Self::publish_view(&registry, now), evicted)
        };

        *self.published.write().unwrap() = Some(state.clone());
        *self.last_error.lock().unwrap() = None;
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        logger::info(
            LogTag::Cache,
            &format!(
                "Recent window refreshed: {} entries, {} evicted, in {}ms",
                state.records.len(),
                evicted,
                started.elapsed().as_millis()
            ),
        );
        Ok(state)
    }

    /// Drop entries past retention, then trim to capacity keeping the most
    /// recently seen. Timestamp ties break on identity so eviction is
    /// deterministic. Safe to run any number of times on the same registry.
    fn evict(
        registry: &mut HashMap<TokenIdentity, RecentEntry>,
        now: DateTime<Utc>,
        retention: chrono::Duration,
        capacity: usize,
    ) -> usize {
        let before = registry.len();
        let cutoff = now - retention;
        registry.retain(|_, entry| entry.last_seen_at >= cutoff);

        if registry.len() > capacity {
            let mut order: Vec<(DateTime<Utc>, TokenIdentity)> = registry
                .iter()
                .map(|(identity, entry)| (entry.last_seen_at, identity.clone()))
                .collect();
            order.sort_by(|a, b| {
                b.0.cmp(&a.0)
                    .then_with(|| a.1.chain_id.cmp(&b.1.chain_id))
                    .then_with(|| a.1.token_address.cmp(&b.1.token_address))
            });
            for (_, identity) in order.drain(capacity..) {
                registry.remove(&identity);
            }
        }
        before - registry.len()
    }

    /// Assemble the publishable window: entries by last sighting (newest
    /// first, identity breaking ties), ranks re-dealt 1..N.
    fn publish_view(
        registry: &HashMap<TokenIdentity, RecentEntry>,
        now: DateTime<Utc>,
    ) -> SnapshotState {
        let mut entries: Vec<&RecentEntry> = registry.values().collect();
        entries.sort_by(|a, b| {
            b.last_seen_at
                .cmp(&a.last_seen_at)
                .then_with(|| {
                    a.last_record
                        .identity
                        .chain_id
                        .cmp(&b.last_record.identity.chain_id)
                })
                .then_with(|| {
                    a.last_record
                        .identity
                        .token_address
                        .cmp(&b.last_record.identity.token_address)
                })
        });
        let records = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| BubbleRecord::assemble(i + 1, &entry.last_record, Some(&entry.metadata)))
            .collect();
        SnapshotState {
            records,
            captured_at: now,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    pub fn current(&self) -> Option<SnapshotState> {
        self.published.read().unwrap().clone()
    }

    pub fn last_error(&self) -> Option<RefreshError> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
