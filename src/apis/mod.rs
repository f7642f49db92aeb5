/// Upstream API clients
///
/// `client` holds the shared HTTP plumbing (timeouts, rate limiting, retry
/// with backoff); `dexscreener` is the concrete listing/metadata client.
/// The [`MarketDataApi`] trait is the seam the refresh pipeline talks to,
/// so every pipeline stage is testable without the network.
pub mod client;
pub mod dexscreener;

#[cfg(test)]
pub(crate) mod mock;

pub use dexscreener::{DexScreenerClient, PairSnapshot};

use crate::config::FeedConfig;
use crate::errors::ApiError;
use crate::types::{PairIdentity, UpstreamRecord};
use async_trait::async_trait;

/// The three upstream operations the refresh pipeline depends on.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// Fetch one listing feed, normalized into upstream records.
    async fn fetch_listing_feed(&self, feed: &FeedConfig) -> Result<Vec<UpstreamRecord>, ApiError>;

    /// Batched token-level lookup: all reported pairs for up to 30 token
    /// addresses on one chain.
    async fn fetch_token_batch(
        &self,
        chain_id: &str,
        addresses: &[String],
    ) -> Result<Vec<PairSnapshot>, ApiError>;

    /// Precise pair-level lookup for exactly one pair; `None` when the
    /// upstream does not know the pair.
    async fn fetch_pair(&self, pair: &PairIdentity) -> Result<Option<PairSnapshot>, ApiError>;
}
