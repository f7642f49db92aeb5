/// Two-pass metadata enrichment
///
/// Pass 1 batches token-level lookups per chain under bounded concurrency
/// and keeps, per token, the reported pair with the highest liquidity.
/// Pass 2 resolves precise pair-level metadata through a pull-based worker
/// pool and overlays it on top of the batch results. Failures at either
/// pass degrade to partial metadata for the affected identities; they never
/// abort a refresh.
use crate::apis::{MarketDataApi, PairSnapshot};
use crate::config::EnrichmentConfig;
use crate::logger::{self, LogTag};
use crate::types::{PairIdentity, TokenIdentity, TokenMetadata, UpstreamRecord};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

pub struct MetadataEnricher {
    api: Arc<dyn MarketDataApi>,
    config: EnrichmentConfig,
}

impl MetadataEnricher {
    pub fn new(api: Arc<dyn MarketDataApi>, config: &EnrichmentConfig) -> Self {
        Self {
            api,
            config: config.clone(),
        }
    }

    /// Resolve metadata for every record, token pass then pair pass.
    pub async fn enrich(
        &self,
        records: &[UpstreamRecord],
    ) -> HashMap<TokenIdentity, TokenMetadata> {
        if records.is_empty() {
            return HashMap::new();
        }

        let mut metadata = self.token_pass(records).await;
        let pair_targets = self.derive_pairs(records, &metadata);
        let pair_metadata = self.pair_pass(&pair_targets).await;

        // Overlay order is strictly token-pass-then-pair-pass: the precise
        // pass wins field-by-field without erasing resolved values.
        for (identity, pair) in &pair_targets {
            if let Some(precise) = pair_metadata.get(pair) {
                metadata.entry(identity.clone()).or_default().overlay(precise);
            }
        }

        logger::debug(
            LogTag::Enricher,
            &format!(
                "Enriched {}/{} tokens ({} pair lookups)",
                metadata.len(),
                records.len(),
                pair_metadata.len()
            ),
        );
        metadata
    }

    /// Pass 1: batched token-level lookups, bounded by `batch_concurrency`.
    async fn token_pass(
        &self,
        records: &[UpstreamRecord],
    ) -> HashMap<TokenIdentity, TokenMetadata> {
        // Partition by chain, preserving first-seen order within each chain.
        let mut chain_order: Vec<String> = Vec::new();
        let mut by_chain: HashMap<String, Vec<String>> = HashMap::new();
        let mut seen: HashSet<TokenIdentity> = HashSet::new();
        for record in records {
            if seen.insert(record.identity.clone()) {
                let chain = record.identity.chain_id.clone();
                if !by_chain.contains_key(&chain) {
                    chain_order.push(chain.clone());
                }
                by_chain
                    .entry(chain)
                    .or_default()
                    .push(record.identity.token_address.clone());
            }
        }

        let batch_size = self.config.batch_size.max(1);
        let mut batches: Vec<(String, Vec<String>)> = Vec::new();
        for chain in &chain_order {
            for chunk in by_chain[chain].chunks(batch_size) {
                batches.push((chain.clone(), chunk.to_vec()));
            }
        }

        let api = &self.api;
        let results: Vec<(String, Result<Vec<PairSnapshot>, _>)> = stream::iter(batches)
            .map(|(chain, addresses)| async move {
                let result = api.fetch_token_batch(&chain, &addresses).await;
                (chain, result)
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        // Per token keep the pair with the highest reported liquidity;
        // equal liquidity keeps the first seen.
        let mut best: HashMap<TokenIdentity, PairSnapshot> = HashMap::new();
        for (chain, result) in results {
            match result {
                Ok(pairs) => {
                    for pair in pairs {
                        let identity = pair.token_identity();
                        let replace = match best.get(&identity) {
                            Some(current) => {
                                pair.liquidity_usd.unwrap_or(0.0)
                                    > current.liquidity_usd.unwrap_or(0.0)
                            }
                            None => true,
                        };
                        if replace {
                            best.insert(identity, pair);
                        }
                    }
                }
                Err(err) => {
                    logger::warning(
                        LogTag::Enricher,
                        &format!(
                            "Token batch on '{}' failed, identities stay unenriched: {}",
                            chain, err
                        ),
                    );
                }
            }
        }

        best.into_iter()
            .map(|(identity, pair)| (identity, metadata_from_pair(&pair)))
            .collect()
    }

    /// Associate each token with the pair to use for the precise pass:
    /// derived from the listing URL when its chain segment matches, else
    /// from the pair address resolved by pass 1.
    fn derive_pairs(
        &self,
        records: &[UpstreamRecord],
        metadata: &HashMap<TokenIdentity, TokenMetadata>,
    ) -> Vec<(TokenIdentity, PairIdentity)> {
        let mut targets: Vec<(TokenIdentity, PairIdentity)> = Vec::new();
        let mut assigned: HashSet<TokenIdentity> = HashSet::new();
        for record in records {
            let identity = record.identity.clone();
            if !assigned.insert(identity.clone()) {
                continue;
            }
            if let Some(pair) = pair_from_listing_url(record) {
                targets.push((identity, pair));
            } else if let Some(address) = metadata
                .get(&identity)
                .and_then(|m| m.pair_address.clone())
            {
                let pair = PairIdentity::new(&identity.chain_id, &address);
                targets.push((identity, pair));
            }
        }
        targets
    }

    /// Pass 2: precise pair lookups through a pool of `pair_concurrency`
    /// workers pulling from a shared cursor, so slow lookups never starve
    /// idle workers.
    async fn pair_pass(
        &self,
        pair_targets: &[(TokenIdentity, PairIdentity)],
    ) -> HashMap<PairIdentity, TokenMetadata> {
        // Identical pair requests collapse into one unit of work.
        let mut queue: Vec<PairIdentity> = Vec::new();
        let mut seen: HashSet<PairIdentity> = HashSet::new();
        for (_, pair) in pair_targets {
            if seen.insert(pair.clone()) {
                queue.push(pair.clone());
            }
        }
        if queue.is_empty() {
            return HashMap::new();
        }

        let targets = Arc::new(queue);
        let cursor = Arc::new(AtomicUsize::new(0));
        let workers = (0..self.config.pair_concurrency.max(1)).map(|_| {
            let targets = targets.clone();
            let cursor = cursor.clone();
            let api = self.api.clone();
            async move {
                let mut resolved: Vec<(PairIdentity, TokenMetadata)> = Vec::new();
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= targets.len() {
                        break;
                    }
                    let pair = &targets[index];
                    match api.fetch_pair(pair).await {
                        Ok(Some(snapshot)) => {
                            resolved.push((pair.clone(), metadata_from_pair(&snapshot)));
                        }
                        Ok(None) => {
                            logger::debug(
                                LogTag::Enricher,
                                &format!("Pair {} unknown upstream", pair),
                            );
                        }
                        Err(err) => {
                            logger::warning(
                                LogTag::Enricher,
                                &format!(
                                    "Pair lookup {} failed, keeping partial metadata: {}",
                                    pair, err
                                ),
                            );
                        }
                    }
                }
                resolved
            }
        });

        join_all(workers).await.into_iter().flatten().collect()
    }
}

fn metadata_from_pair(pair: &PairSnapshot) -> TokenMetadata {
    TokenMetadata {
        name: pair.base_token_name.clone(),
        symbol: pair.base_token_symbol.clone(),
        icon_url: pair.image_url.clone(),
        header_url: pair.header_url.clone(),
        market_cap: pair.market_cap,
        pair_address: Some(pair.pair_address.clone()),
    }
}

/// Extract the pair address from a listing URL of the form
/// `https://.../{chain}/{pairAddress}`; only trusted when the chain segment
/// matches the record's chain.
fn pair_from_listing_url(record: &UpstreamRecord) -> Option<PairIdentity> {
    let url = Url::parse(&record.url).ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    let chain = segments[segments.len() - 2];
    if !chain.eq_ignore_ascii_case(&record.identity.chain_id) {
        return None;
    }
    Some(PairIdentity::new(
        &record.identity.chain_id,
        segments[segments.len() - 1],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::mock::{listing, pair_snapshot, MockMarketData};

    fn enricher(mock: Arc<MockMarketData>) -> MetadataEnricher {
        MetadataEnricher::new(mock, &EnrichmentConfig::default())
    }

    #[test]
    fn test_pair_from_listing_url() {
        let record = listing("solana", "tok1", "top", 0.0);
        // mock listing urls are https://dexscreener.com/{chain}/{addr}-pair
        let pair = pair_from_listing_url(&record).unwrap();
        assert_eq!(pair, PairIdentity::new("solana", "tok1-pair"));

        let mut foreign = listing("solana", "tok1", "top", 0.0);
        foreign.url = "https://dexscreener.com/ethereum/0xabc".to_string();
        assert!(pair_from_listing_url(&foreign).is_none());

        let mut short = listing("solana", "tok1", "top", 0.0);
        short.url = "https://dexscreener.com/".to_string();
        assert!(pair_from_listing_url(&short).is_none());
    }

    #[tokio::test]
    async fn test_highest_liquidity_pair_wins_token_pass() {
        let mock = Arc::new(MockMarketData::new());
        mock.set_batch(
            "solana",
            vec![
                pair_snapshot("solana", "shallow", "tok1", Some("ONE"), 100.0),
                pair_snapshot("solana", "deep", "tok1", Some("ONE"), 50_000.0),
                pair_snapshot("solana", "middle", "tok1", Some("ONE"), 500.0),
            ],
        );
        let mut record = listing("solana", "tok1", "top", 0.0);
        record.url = "https://example.com/not-a-pair-url".to_string();

        let metadata = enricher(mock).enrich(&[record]).await;
        let meta = &metadata[&TokenIdentity::new("solana", "tok1")];
        assert_eq!(meta.pair_address.as_deref(), Some("deep"));
        assert_eq!(meta.symbol.as_deref(), Some("ONE"));
    }

    #[tokio::test]
    async fn test_pair_pass_overlays_token_pass() {
        // Token-level resolves symbol only; pair-level resolves marketCap
        // but not symbol. Final metadata must carry both.
        let mock = Arc::new(MockMarketData::new());
        let mut batch_pair = pair_snapshot("solana", "tok1-pair", "tok1", Some("ABC"), 100.0);
        batch_pair.market_cap = None;
        mock.set_batch("solana", vec![batch_pair]);

        let mut precise = pair_snapshot("solana", "tok1-pair", "tok1", None, 100.0);
        precise.market_cap = Some(1_000_000.0);
        mock.set_pair(precise);

        let record = listing("solana", "tok1", "top", 0.0);
        let metadata = enricher(mock).enrich(&[record]).await;
        let meta = &metadata[&TokenIdentity::new("solana", "tok1")];
        assert_eq!(meta.symbol.as_deref(), Some("ABC"));
        assert_eq!(meta.market_cap, Some(1_000_000.0));
    }

    #[tokio::test]
    async fn test_batch_failure_degrades_to_pair_pass_only() {
        let mock = Arc::new(MockMarketData::new());
        mock.set_fail_batches(true);
        let mut precise = pair_snapshot("solana", "tok1-pair", "tok1", Some("ABC"), 100.0);
        precise.market_cap = Some(42.0);
        mock.set_pair(precise);

        let record = listing("solana", "tok1", "top", 0.0);
        let metadata = enricher(mock).enrich(&[record]).await;
        let meta = &metadata[&TokenIdentity::new("solana", "tok1")];
        assert_eq!(meta.symbol.as_deref(), Some("ABC"));
        assert_eq!(meta.market_cap, Some(42.0));
    }

    #[tokio::test]
    async fn test_total_enrichment_failure_yields_empty_map() {
        let mock = Arc::new(MockMarketData::new());
        mock.set_fail_batches(true);
        mock.set_fail_pairs(true);
        let record = listing("solana", "tok1", "top", 0.0);
        let metadata = enricher(mock).enrich(&[record]).await;
        assert!(metadata.is_empty());
    }

    #[tokio::test]
    async fn test_identical_pair_requests_deduplicated() {
        let mock = Arc::new(MockMarketData::new());
        // Two records point at the same pair URL
        let mut a = listing("solana", "tok1", "top", 0.0);
        a.url = "https://dexscreener.com/solana/shared-pair".to_string();
        let mut b = listing("solana", "tok2", "latest", 0.0);
        b.url = "https://dexscreener.com/solana/shared-pair".to_string();

        let enricher = enricher(mock.clone());
        let _ = enricher.enrich(&[a, b]).await;
        assert_eq!(mock.pair_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_resolved_pair_address() {
        // Listing URL chain segment does not match, so the pair identity
        // must come from pass 1's resolved pair address.
        let mock = Arc::new(MockMarketData::new());
        mock.set_batch(
            "solana",
            vec![pair_snapshot("solana", "resolved-pair", "tok1", Some("ONE"), 10.0)],
        );
        let mut precise = pair_snapshot("solana", "resolved-pair", "tok1", Some("ONE"), 10.0);
        precise.market_cap = Some(7.0);
        mock.set_pair(precise);

        let mut record = listing("solana", "tok1", "top", 0.0);
        record.url = "https://dexscreener.com/ethereum/other".to_string();

        let metadata = enricher(mock.clone()).enrich(&[record]).await;
        let meta = &metadata[&TokenIdentity::new("solana", "tok1")];
        assert_eq!(meta.market_cap, Some(7.0));
        assert_eq!(mock.pair_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batches_respect_chunk_size() {
        let mock = Arc::new(MockMarketData::new());
        let records: Vec<UpstreamRecord> = (0..65)
            .map(|i| {
                let mut r = listing("solana", &format!("tok{}", i), "top", 0.0);
                r.url = "https://example.com/none".to_string();
                r
            })
            .collect();
        let _ = enricher(mock.clone()).enrich(&records).await;
        // 65 tokens at batch size 30 -> 3 batch calls
        assert_eq!(mock.batch_calls.load(Ordering::SeqCst), 3);
    }
}
