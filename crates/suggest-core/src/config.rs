//! Engine configuration (§5 parameters).
//!
//! A plain struct with [`Default`] values matching the specification,
//! overridable from the environment by [`EngineConfig::from_env`]. No
//! configuration-file crate: the knob count is small and fixed, so a struct
//! literal (or a handful of env vars for the daemon binary) is enough.

use crate::ranking::RankingWeights;
use chrono::Duration;

/// Tunable parameters for a [`crate::engine::SuggestionEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default number of suggestions returned per lookup, and the per-node
    /// cache size in the Prefix Index.
    pub k: usize,
    /// Sliding window for the Trending Tracker's decay half-life.
    pub trending_window: Duration,
    /// Cap on phrases tracked by the Trending Tracker (`N_trend`).
    pub trending_top_n: usize,
    /// Recent-history entries retained per session (`H`).
    pub history_max_entries: usize,
    /// Age at which session history expires (`T_user`).
    pub history_max_age: Duration,
    /// Suggestion cache TTL for a hot (non-personalized) prefix (`T_cache_hot`).
    pub cache_ttl_hot: std::time::Duration,
    /// Suggestion cache TTL for a personalized lookup (`T_cache_user`).
    pub cache_ttl_user: std::time::Duration,
    /// Interval between Aggregator flushes (`T_flush`).
    pub flush_interval: std::time::Duration,
    /// Pending-write threshold that forces an out-of-cycle flush (`N_flush`).
    pub flush_batch_size: usize,
    /// Durable/indexed drift that triggers a full Prefix Index rebuild.
    pub rebuild_threshold: u64,
    /// Row cap on a single rebuild's load from the Log Store (`N_rebuild`):
    /// at most this many phrases, highest count first, are loaded back into
    /// the index on `new`/`rebuild`.
    pub rebuild_cap: u64,
    /// Ranking Composer signal weights.
    pub weights: RankingWeights,
    /// Per-lookup deadline before `suggest` returns `DeadlineExceeded`.
    pub lookup_deadline: std::time::Duration,
    /// Maximum number of distinct (prefix, session, mode) entries held in
    /// the read-through suggestion cache.
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            k: 10,
            trending_window: Duration::minutes(60),
            trending_top_n: 1000,
            history_max_entries: 50,
            history_max_age: Duration::days(30),
            cache_ttl_hot: std::time::Duration::from_secs(30),
            cache_ttl_user: std::time::Duration::from_secs(5),
            flush_interval: std::time::Duration::from_secs(5),
            flush_batch_size: 10_000,
            rebuild_threshold: 100_000,
            rebuild_cap: 100_000,
            weights: RankingWeights::default(),
            lookup_deadline: std::time::Duration::from_millis(50),
            cache_capacity: 10_000,
        }
    }
}

impl EngineConfig {
    /// Start from [`Default`] and apply `SUGGEST_*` environment overrides,
    /// for the handful of knobs an operator plausibly wants to tune without
    /// a rebuild (§6, daemon startup).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(k) = env_usize("SUGGEST_K") {
            config.k = k;
        }
        if let Some(secs) = env_u64("SUGGEST_TRENDING_WINDOW_SECS") {
            config.trending_window = Duration::seconds(secs as i64);
        }
        if let Some(n) = env_usize("SUGGEST_TRENDING_TOP_N") {
            config.trending_top_n = n;
        }
        if let Some(n) = env_usize("SUGGEST_HISTORY_MAX_ENTRIES") {
            config.history_max_entries = n;
        }
        if let Some(days) = env_u64("SUGGEST_HISTORY_MAX_AGE_DAYS") {
            config.history_max_age = Duration::days(days as i64);
        }
        if let Some(secs) = env_u64("SUGGEST_FLUSH_INTERVAL_SECS") {
            config.flush_interval = std::time::Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("SUGGEST_FLUSH_BATCH_SIZE") {
            config.flush_batch_size = n as usize;
        }
        if let Some(n) = env_u64("SUGGEST_REBUILD_THRESHOLD") {
            config.rebuild_threshold = n;
        }
        if let Some(n) = env_u64("SUGGEST_REBUILD_CAP") {
            config.rebuild_cap = n;
        }
        if let Some(ms) = env_u64("SUGGEST_LOOKUP_DEADLINE_MS") {
            config.lookup_deadline = std::time::Duration::from_millis(ms);
        }
        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
