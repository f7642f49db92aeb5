/// Source aggregation: concurrent feed fan-out, merge and dedup
///
/// Feeds are fetched concurrently but merged in fixed priority order, so the
/// highest-priority source always wins identity ties. A failing supplementary
/// feed contributes nothing; a failing primary feed fails the whole refresh.
use crate::apis::MarketDataApi;
use crate::config::{FeedConfig, SourcesConfig};
use crate::errors::RefreshError;
use crate::logger::{self, LogTag};
use crate::types::{TokenIdentity, UpstreamRecord};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

pub struct SourceAggregator {
    api: Arc<dyn MarketDataApi>,
    feeds: Vec<FeedConfig>,
    blacklist: HashSet<String>,
    chains: HashSet<String>,
}

impl SourceAggregator {
    pub fn new(api: Arc<dyn MarketDataApi>, sources: &SourcesConfig) -> Self {
        Self {
            api,
            feeds: sources.feeds.clone(),
            blacklist: sources
                .blacklist
                .iter()
                .map(|a| a.to_lowercase())
                .collect(),
            chains: sources.chains.iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    /// Fetch every configured feed, merge in priority order, dedup by token
    /// identity (first occurrence wins) and truncate to `limit`.
    pub async fn collect(&self, limit: usize) -> Result<Vec<UpstreamRecord>, RefreshError> {
        let fetches = self.feeds.iter().map(|feed| self.api.fetch_listing_feed(feed));
        let results = join_all(fetches).await;

        let mut merged: Vec<UpstreamRecord> = Vec::new();
        for (index, (feed, result)) in self.feeds.iter().zip(results).enumerate() {
            match result {
                Ok(records) => {
                    logger::debug(
                        LogTag::Aggregator,
                        &format!("Feed '{}' returned {} records", feed.name, records.len()),
                    );
                    merged.extend(records);
                }
                Err(err) if index == 0 => {
                    logger::error(
                        LogTag::Aggregator,
                        &format!("Primary feed '{}' failed: {}", feed.name, err),
                    );
                    return Err(RefreshError::PrimarySource {
                        source: feed.name.clone(),
                        cause: err,
                    });
                }
                Err(err) => {
                    logger::warning(
                        LogTag::Aggregator,
                        &format!(
                            "Supplementary feed '{}' failed, contributing nothing: {}",
                            feed.name, err
                        ),
                    );
                }
            }
        }

        let total = merged.len();
        let deduped = self.dedup(merged, limit);
        logger::debug(
            LogTag::Aggregator,
            &format!(
                "Merged {} feed records into {} unique tokens (limit {})",
                total,
                deduped.len(),
                limit
            ),
        );
        Ok(deduped)
    }

    fn accepts(&self, record: &UpstreamRecord) -> bool {
        if self.blacklist.contains(&record.identity.token_address) {
            return false;
        }
        if !self.chains.is_empty() && !self.chains.contains(&record.identity.chain_id) {
            return false;
        }
        true
    }

    fn dedup(&self, merged: Vec<UpstreamRecord>, limit: usize) -> Vec<UpstreamRecord> {
        let mut seen: HashSet<TokenIdentity> = HashSet::new();
        let mut out: Vec<UpstreamRecord> = Vec::new();
        for record in merged {
            if !self.accepts(&record) {
                continue;
            }
            if seen.insert(record.identity.clone()) {
                out.push(record);
                if out.len() >= limit {
                    break;
                }
            }
        }
        out
    }
}
