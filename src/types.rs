/// Core data model for the aggregation pipeline
///
/// Identity keys, normalized upstream records, enrichment metadata and the
/// published snapshot types shared by the aggregator, enricher and caches.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// IDENTITY KEYS
// ============================================================================

/// Canonical `(chain, token address)` key identifying a token across sources.
///
/// Both components are lowercased on construction so the same token reported
/// by different feeds (or with different address casing) dedups to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub chain_id: String,
    pub token_address: String,
}

impl TokenIdentity {
    pub fn new(chain_id: &str, token_address: &str) -> Self {
        Self {
            chain_id: chain_id.to_lowercase(),
            token_address: token_address.to_lowercase(),
        }
    }
}

impl std::fmt::Display for TokenIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.token_address)
    }
}

/// Canonical `(chain, trading-pair address)` key used for precise metadata
/// lookups. Preferred over [`TokenIdentity`] once a token's canonical pair
/// is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairIdentity {
    pub chain_id: String,
    pub pair_address: String,
}

impl PairIdentity {
    pub fn new(chain_id: &str, pair_address: &str) -> Self {
        Self {
            chain_id: chain_id.to_lowercase(),
            pair_address: pair_address.to_lowercase(),
        }
    }
}

impl std::fmt::Display for PairIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.pair_address)
    }
}

// ============================================================================
// UPSTREAM RECORDS
// ============================================================================

/// External link attached to a listing (website, twitter, telegram, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordLink {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One normalized listing entry from a single upstream feed.
///
/// Feeds without a native weight report `boost_amount = 0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamRecord {
    pub identity: TokenIdentity,
    pub url: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub header: Option<String>,
    pub links: Vec<RecordLink>,
    pub boost_amount: f64,
    /// Name of the feed this record came from (first feed = primary).
    pub source: String,
}

// ============================================================================
// ENRICHMENT METADATA
// ============================================================================

/// Partial enrichment view for one token.
///
/// Enrichment passes produce overlapping partial views; later, more precise
/// passes override earlier ones field-by-field via [`TokenMetadata::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub icon_url: Option<String>,
    pub header_url: Option<String>,
    pub market_cap: Option<f64>,
    pub pair_address: Option<String>,
}

impl TokenMetadata {
    /// Merge `other` into `self`, field by field.
    ///
    /// A field present in `other` wins; a field absent in `other` never
    /// clears a value already resolved here. This keeps metadata completeness
    /// monotonically non-decreasing across enrichment passes.
    pub fn overlay(&mut self, other: &TokenMetadata) {
        if other.name.is_some() {
            self.name = other.name.clone();
        }
        if other.symbol.is_some() {
            self.symbol = other.symbol.clone();
        }
        if other.icon_url.is_some() {
            self.icon_url = other.icon_url.clone();
        }
        if other.header_url.is_some() {
            self.header_url = other.header_url.clone();
        }
        if other.market_cap.is_some() {
            self.market_cap = other.market_cap;
        }
        if other.pair_address.is_some() {
            self.pair_address = other.pair_address.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.symbol.is_none()
            && self.icon_url.is_none()
            && self.header_url.is_none()
            && self.market_cap.is_none()
            && self.pair_address.is_none()
    }
}

// ============================================================================
// PUBLISHED SNAPSHOT TYPES
// ============================================================================

/// One output record: identity + rank + merged metadata + source fields.
///
/// Rank is assigned purely by final list position (1-based) and is recomputed
/// on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BubbleRecord {
    pub identity: TokenIdentity,
    pub rank: usize,
    pub url: String,
    pub description: Option<String>,
    pub links: Vec<RecordLink>,
    pub boost_amount: f64,
    pub source: String,
    #[serde(flatten)]
    pub metadata: TokenMetadata,
}

impl BubbleRecord {
    /// Build an output record from a listing record and its merged metadata.
    ///
    /// The feed-supplied icon/header act as a fallback when enrichment did
    /// not resolve one.
    pub fn assemble(rank: usize, record: &UpstreamRecord, metadata: Option<&TokenMetadata>) -> Self {
        let mut merged = TokenMetadata {
            icon_url: record.icon.clone(),
            header_url: record.header.clone(),
            ..TokenMetadata::default()
        };
        if let Some(meta) = metadata {
            merged.overlay(meta);
        }
        Self {
            identity: record.identity.clone(),
            rank,
            url: record.url.clone(),
            description: record.description.clone(),
            links: record.links.clone(),
            boost_amount: record.boost_amount,
            source: record.source.clone(),
            metadata: merged,
        }
    }
}

/// The rolling snapshot published to readers, replaced wholesale per refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotState {
    pub records: Vec<BubbleRecord>,
    pub captured_at: DateTime<Utc>,
}

impl SnapshotState {
    /// Assemble an ordered snapshot from deduped records plus enrichment.
    /// Ranks are 1..N in list order.
    pub fn assemble(
        records: &[UpstreamRecord],
        metadata: &HashMap<TokenIdentity, TokenMetadata>,
    ) -> Self {
        let bubbles = records
            .iter()
            .enumerate()
            .map(|(i, rec)| BubbleRecord::assemble(i + 1, rec, metadata.get(&rec.identity)))
            .collect();
        Self {
            records: bubbles,
            captured_at: Utc::now(),
        }
    }

    /// Age of this snapshot as a std `Duration` (zero if the clock skewed).
    pub fn age(&self) -> std::time::Duration {
        (Utc::now() - self.captured_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// One entry in the recent-window registry, keyed by [`TokenIdentity`].
///
/// Mutated in place by each refresh cycle that re-observes the token,
/// created on first sighting, deleted by eviction.
#[derive(Debug, Clone)]
pub struct RecentEntry {
    pub last_record: UpstreamRecord,
    pub last_seen_at: DateTime<Utc>,
    pub metadata: TokenMetadata,
}
