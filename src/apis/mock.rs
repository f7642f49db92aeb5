/// Deterministic in-memory MarketDataApi used by pipeline tests
use super::{MarketDataApi, PairSnapshot};
use crate::config::FeedConfig;
use crate::errors::ApiError;
use crate::types::{PairIdentity, TokenIdentity, UpstreamRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) struct MockMarketData {
    feeds: Mutex<HashMap<String, Result<Vec<UpstreamRecord>, ApiError>>>,
    batches: Mutex<HashMap<String, Vec<PairSnapshot>>>,
    pairs: Mutex<HashMap<PairIdentity, PairSnapshot>>,
    listing_delay: Mutex<Option<Duration>>,
    fail_batches: Mutex<bool>,
    fail_pairs: Mutex<bool>,
    pub listing_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub pair_calls: AtomicUsize,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            feeds: Mutex::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
            pairs: Mutex::new(HashMap::new()),
            listing_delay: Mutex::new(None),
            fail_batches: Mutex::new(false),
            fail_pairs: Mutex::new(false),
            listing_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            pair_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_feed(&self, name: &str, result: Result<Vec<UpstreamRecord>, ApiError>) {
        self.feeds.lock().unwrap().insert(name.to_string(), result);
    }

    pub fn set_batch(&self, chain_id: &str, pairs: Vec<PairSnapshot>) {
        self.batches
            .lock()
            .unwrap()
            .insert(chain_id.to_string(), pairs);
    }

    pub fn set_pair(&self, snapshot: PairSnapshot) {
        self.pairs
            .lock()
            .unwrap()
            .insert(snapshot.pair_identity(), snapshot);
    }

    pub fn set_listing_delay(&self, delay: Duration) {
        *self.listing_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fail_batches(&self, fail: bool) {
        *self.fail_batches.lock().unwrap() = fail;
    }

    pub fn set_fail_pairs(&self, fail: bool) {
        *self.fail_pairs.lock().unwrap() = fail;
    }

    fn transient(endpoint: &str) -> ApiError {
        ApiError::Connection {
            endpoint: endpoint.to_string(),
            detail: "mock failure".to_string(),
        }
    }
}

#[async_trait]
impl MarketDataApi for MockMarketData {
    async fn fetch_listing_feed(&self, feed: &FeedConfig) -> Result<Vec<UpstreamRecord>, ApiError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.listing_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.feeds
            .lock()
            .unwrap()
            .get(&feed.name)
            .cloned()
            .unwrap_or_else(|| Ok(vec![]))
    }

    async fn fetch_token_batch(
        &self,
        chain_id: &str,
        addresses: &[String],
    ) -> Result<Vec<PairSnapshot>, ApiError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_batches.lock().unwrap() {
            return Err(Self::transient("tokens/v1"));
        }
        let batches = self.batches.lock().unwrap();
        let pairs = batches.get(chain_id).cloned().unwrap_or_default();
        Ok(pairs
            .into_iter()
            .filter(|p| addresses.contains(&p.base_token_address.to_lowercase()))
            .collect())
    }

    async fn fetch_pair(&self, pair: &PairIdentity) -> Result<Option<PairSnapshot>, ApiError> {
        self.pair_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_pairs.lock().unwrap() {
            return Err(Self::transient("latest/dex/pairs"));
        }
        Ok(self.pairs.lock().unwrap().get(pair).cloned())
    }
}

/// Build a listing record the way a feed would report it.
pub(crate) fn listing(chain: &str, addr: &str, source: &str, boost: f64) -> UpstreamRecord {
    UpstreamRecord {
        identity: TokenIdentity::new(chain, addr),
        url: format!("https://dexscreener.com/{}/{}-pair", chain, addr),
        description: Some(format!("{} from {}", addr, source)),
        icon: None,
        header: None,
        links: vec![],
        boost_amount: boost,
        source: source.to_string(),
    }
}

/// Build a pair snapshot as returned by the batch/pair endpoints.
pub(crate) fn pair_snapshot(
    chain: &str,
    pair_addr: &str,
    token_addr: &str,
    symbol: Option<&str>,
    liquidity_usd: f64,
) -> PairSnapshot {
    PairSnapshot {
        chain_id: chain.to_string(),
        pair_address: pair_addr.to_string(),
        base_token_address: token_addr.to_string(),
        base_token_name: symbol.map(|s| format!("{} Token", s)),
        base_token_symbol: symbol.map(|s| s.to_string()),
        image_url: None,
        header_url: None,
        market_cap: None,
        liquidity_usd: Some(liquidity_usd),
    }
}

/// Feed configs matching the default priority order, for tests.
pub(crate) fn test_feeds() -> Vec<FeedConfig> {
    vec![
        FeedConfig {
            name: "top".to_string(),
            path: "token-boosts/top/v1".to_string(),
            weighted: true,
        },
        FeedConfig {
            name: "latest".to_string(),
            path: "token-boosts/latest/v1".to_string(),
            weighted: true,
        },
        FeedConfig {
            name: "profiles".to_string(),
            path: "token-profiles/latest/v1".to_string(),
            weighted: false,
        },
    ]
}
