/// DexScreener API client
///
/// API Documentation: https://docs.dexscreener.com/api/reference
///
/// Endpoints used:
/// 1. /token-boosts/top/v1 - Top boosted tokens (primary listing feed)
/// 2. /token-boosts/latest/v1 - Latest boosted tokens
/// 3. /token-profiles/latest/v1 - Latest token profiles
/// 4. /tokens/v1/{chainId}/{tokenAddresses} - Pairs for up to 30 tokens (batch)
/// 5. /latest/dex/pairs/{chainId}/{pairId} - Single pair by chain/address
use super::client::{HttpClient, RateLimiter};
use super::MarketDataApi;
use crate::config::{ApiConfig, FeedConfig};
use crate::errors::ApiError;
use crate::logger::{self, LogTag};
use crate::types::{PairIdentity, RecordLink, TokenIdentity, UpstreamRecord};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Maximum tokens per batch request
const MAX_TOKENS_PER_REQUEST: usize = 30;

/// Rate limits per endpoint class (requests per minute)
const RATE_LIMIT_LISTINGS_PER_MINUTE: usize = 60;
const RATE_LIMIT_TOKEN_BATCH_PER_MINUTE: usize = 300;
const RATE_LIMIT_PAIR_LOOKUP_PER_MINUTE: usize = 300;

// ============================================================================
// CLIENT
// ============================================================================

pub struct DexScreenerClient {
    http: HttpClient,
    base_url: String,
    listing_attempts: u32,
    enrichment_attempts: u32,
    retry_base_delay: Duration,
    limiter_listings: RateLimiter,
    limiter_token_batch: RateLimiter,
    limiter_pair_lookup: RateLimiter,
}

impl DexScreenerClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = HttpClient::new(config.timeout_secs).map_err(anyhow::Error::msg)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            listing_attempts: config.listing_attempts,
            enrichment_attempts: config.enrichment_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            limiter_listings: RateLimiter::new(RATE_LIMIT_LISTINGS_PER_MINUTE),
            limiter_token_batch: RateLimiter::new(RATE_LIMIT_TOKEN_BATCH_PER_MINUTE),
            limiter_pair_lookup: RateLimiter::new(RATE_LIMIT_PAIR_LOOKUP_PER_MINUTE),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl MarketDataApi for DexScreenerClient {
    async fn fetch_listing_feed(&self, feed: &FeedConfig) -> Result<Vec<UpstreamRecord>, ApiError> {
        logger::debug(
            LogTag::Api,
            &format!("Fetching listing feed '{}': {}", feed.name, feed.path),
        );
        let raw: Vec<RawListing> = self
            .http
            .get_json_with_retry(
                &feed.path,
                &self.url(&feed.path),
                &self.limiter_listings,
                self.listing_attempts,
                self.retry_base_delay,
            )
            .await?;
        Ok(raw.into_iter().map(|r| r.into_record(feed)).collect())
    }

    async fn fetch_token_batch(
        &self,
        chain_id: &str,
        addresses: &[String],
    ) -> Result<Vec<PairSnapshot>, ApiError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = format!("tokens/v1/{}/{}", chain_id, addresses.join(","));
        if addresses.len() > MAX_TOKENS_PER_REQUEST {
            return Err(ApiError::Schema {
                endpoint,
                detail: format!(
                    "too many addresses: {} (max {})",
                    addresses.len(),
                    MAX_TOKENS_PER_REQUEST
                ),
            });
        }

        logger::debug(
            LogTag::Api,
            &format!(
                "Fetching token batch: {} addresses, chain={}",
                addresses.len(),
                chain_id
            ),
        );
        let raw: Vec<RawPair> = self
            .http
            .get_json_with_retry(
                &endpoint,
                &self.url(&endpoint),
                &self.limiter_token_batch,
                self.enrichment_attempts,
                self.retry_base_delay,
            )
            .await?;
        Ok(raw.into_iter().filter_map(RawPair::into_snapshot).collect())
    }

    async fn fetch_pair(&self, pair: &PairIdentity) -> Result<Option<PairSnapshot>, ApiError> {
        let endpoint = format!("latest/dex/pairs/{}/{}", pair.chain_id, pair.pair_address);

        logger::debug(LogTag::Api, &format!("Fetching pair: {}", pair));
        let response: PairLookupResponse = self
            .http
            .get_json_with_retry(
                &endpoint,
                &self.url(&endpoint),
                &self.limiter_pair_lookup,
                self.enrichment_attempts,
                self.retry_base_delay,
            )
            .await?;
        Ok(response.into_pair().and_then(RawPair::into_snapshot))
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// One entry of a listing feed (boosts and profiles share this shape;
/// profile entries simply carry no amount).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListing {
    chain_id: String,
    token_address: String,
    url: String,
    amount: Option<f64>,
    description: Option<String>,
    icon: Option<String>,
    header: Option<String>,
    #[serde(default)]
    links: Vec<RecordLink>,
}

impl RawListing {
    fn into_record(self, feed: &FeedConfig) -> UpstreamRecord {
        let boost_amount = if feed.weighted {
            self.amount.unwrap_or(0.0)
        } else {
            0.0
        };
        UpstreamRecord {
            identity: TokenIdentity::new(&self.chain_id, &self.token_address),
            url: self.url,
            description: self.description,
            icon: self.icon,
            header: self.header,
            links: self.links,
            boost_amount,
            source: feed.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PairLookupResponse {
    pair: Option<RawPair>,
    #[serde(default)]
    pairs: Option<Vec<RawPair>>,
}

impl PairLookupResponse {
    fn into_pair(self) -> Option<RawPair> {
        match self.pair {
            Some(pair) => Some(pair),
            None => self.pairs.and_then(|mut pairs| {
                if pairs.is_empty() {
                    None
                } else {
                    Some(pairs.remove(0))
                }
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPair {
    chain_id: Option<String>,
    pair_address: Option<String>,
    base_token: Option<RawBaseToken>,
    liquidity: Option<RawLiquidity>,
    market_cap: Option<f64>,
    fdv: Option<f64>,
    info: Option<RawPairInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBaseToken {
    address: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLiquidity {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPairInfo {
    image_url: Option<String>,
    header: Option<String>,
}

impl RawPair {
    /// Keep only pairs that actually identify a chain, pair and base token.
    fn into_snapshot(self) -> Option<PairSnapshot> {
        let chain_id = self.chain_id?;
        let pair_address = self.pair_address?;
        let base = self.base_token?;
        let base_token_address = base.address?;
        let (image_url, header_url) = match self.info {
            Some(info) => (info.image_url, info.header),
            None => (None, None),
        };
        Some(PairSnapshot {
            chain_id,
            pair_address,
            base_token_address,
            base_token_name: base.name,
            base_token_symbol: base.symbol,
            image_url,
            header_url,
            market_cap: self.market_cap.or(self.fdv),
            liquidity_usd: self.liquidity.and_then(|l| l.usd),
        })
    }
}

/// Cleaned view of one trading pair, the unit both enrichment passes
/// produce.
#[derive(Debug, Clone)]
pub struct PairSnapshot {
    pub chain_id: String,
    pub pair_address: String,
    pub base_token_address: String,
    pub base_token_name: Option<String>,
    pub base_token_symbol: Option<String>,
    pub image_url: Option<String>,
    pub header_url: Option<String>,
    pub market_cap: Option<f64>,
    pub liquidity_usd: Option<f64>,
}

impl PairSnapshot {
    pub fn token_identity(&self) -> TokenIdentity {
        TokenIdentity::new(&self.chain_id, &self.base_token_address)
    }

    pub fn pair_identity(&self) -> PairIdentity {
        PairIdentity::new(&self.chain_id, &self.pair_address)
    }
}
