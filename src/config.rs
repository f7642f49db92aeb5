/// Runtime configuration loaded from configs.json
///
/// Every concurrency bound and TTL in the pipeline is a knob here rather
/// than a hardcoded constant. A missing file is created with defaults.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub recent: RecentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Attempt ceiling for listing feed fetches
    pub listing_attempts: u32,
    /// Attempt ceiling for enrichment (batch/pair) fetches
    pub enrichment_attempts: u32,
    /// Exponential backoff base, doubled per attempt
    pub retry_base_delay_ms: u64,
}

/// One upstream listing feed. Position in the list is priority order;
/// the first feed is the primary source whose failure is fatal to a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub path: String,
    /// Whether entries of this feed carry a native boost amount
    #[serde(default)]
    pub weighted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub feeds: Vec<FeedConfig>,
    /// Token addresses dropped at aggregation time (lowercased on use)
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// If non-empty, only records from these chains are kept
    #[serde(default)]
    pub chains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Tokens per batched metadata lookup (upstream caps this at 30)
    pub batch_size: usize,
    /// Concurrent batch lookups
    pub batch_concurrency: usize,
    /// Workers in the pair-lookup pool
    pub pair_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub fresh_ttl_secs: u64,
    pub stale_ttl_secs: u64,
    /// Records fetched per refresh when no caller asked for more
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentConfig {
    pub fresh_ttl_secs: u64,
    pub stale_ttl_secs: u64,
    /// Maximum entries retained in the recent-window registry
    pub capacity: usize,
    /// Entries unseen for longer than this are evicted
    pub retention_hours: u64,
    /// Observation window per refresh; larger than capacity on purpose so
    /// tokens that fell out of the top list are still re-observed
    pub observe_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dexscreener.com".to_string(),
            timeout_secs: 10,
            listing_attempts: 3,
            enrichment_attempts: 2,
            retry_base_delay_ms: 200,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feeds: vec![
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
            ],
            blacklist: vec![],
            chains: vec![],
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            batch_concurrency: 3,
            pair_concurrency: 6,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_secs: 30,
            stale_ttl_secs: 120,
            default_limit: 100,
        }
    }
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_secs: 30,
            stale_ttl_secs: 120,
            capacity: 100,
            retention_hours: 6,
            observe_limit: 250,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            sources: SourcesConfig::default(),
            enrichment: EnrichmentConfig::default(),
            snapshot: SnapshotConfig::default(),
            recent: RecentConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Config {
    /// Read configuration from `path`; create the file with defaults when it
    /// does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        if config.sources.feeds.is_empty() {
            anyhow::bail!("Config must list at least one listing feed");
        }
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), data)
            .with_context(|| format!("Failed to write config file {}", path.as_ref().display()))?;
        Ok(())
    }
}
