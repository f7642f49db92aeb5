/// BubbleScreener library
///
/// Trending-token aggregation and caching engine: fans out over the
/// DexScreener listing feeds, dedups and enriches the merged list, and
/// publishes it through snapshot and recent-window cache tiers kept warm
/// by a background scheduler.
pub mod aggregator;
pub mod apis;
pub mod arguments;
pub mod cache;
pub mod config;
pub mod enricher;
pub mod errors;
pub mod logger;
pub mod scheduler;
pub mod service;
pub mod types;
