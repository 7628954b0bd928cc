//! The composition root: [`SuggestionEngine`] owns every component (C1-C7)
//! as explicit values, with no global state, and exposes the read path,
//! the write path, and the admin operations as inherent methods.
//!
//! Grounded on the `Arc<Storage>`-holding composition style in
//! `vestige-mcp::main` (see DESIGN.md), generalized from one storage handle
//! to the engine's full set of collaborators.

use crate::aggregator::{Aggregator, AggregatorStatus};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::filter::FilterGate;
use crate::history::HistoryTracker;
use crate::normalize::NormalizeError;
use crate::ranking::SuggestionResult;
use crate::service::{SuggestRequest, SuggestionService};
use crate::store::{FilterSource, LogStore, SessionStore};
use crate::trending::TrendingTracker;
use crate::trie::PrefixIndex;
use crate::Phrase;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Diagnostic snapshot across every component (admin `status`).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub indexed_phrases: u64,
    pub index_node_count: usize,
    pub trending_tracked: usize,
    pub cached_entries: usize,
    pub blocked_phrases: usize,
    pub aggregator: AggregatorStatus,
}

/// Owns the Prefix Index, Trending Tracker, History Tracker, Filter Gate,
/// Aggregator, and Suggestion Service, and wires them together.
pub struct SuggestionEngine {
    index: Arc<PrefixIndex>,
    trending: Arc<TrendingTracker>,
    history: Arc<HistoryTracker>,
    filter: Arc<FilterGate>,
    aggregator: Arc<Aggregator>,
    service: SuggestionService,
    log_store: Arc<dyn LogStore>,
    rebuild_threshold: u64,
}

impl SuggestionEngine {
    /// Build the engine from its storage collaborators, loading the Prefix
    /// Index and Filter Gate from durable state.
    pub fn new(
        config: EngineConfig,
        log_store: Arc<dyn LogStore>,
        filter_source: Arc<dyn FilterSource>,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Self, EngineError> {
        let now = Utc::now();
        let index = Arc::new(PrefixIndex::new(config.k.max(1)));
        index.rebuild(log_store.load_all_counts(config.rebuild_cap)?)?;

        let trending = Arc::new(TrendingTracker::new(config.trending_window, config.trending_top_n, now));
        let history = Arc::new(HistoryTracker::new(session_store, config.history_max_entries));
        let filter = Arc::new(FilterGate::load(filter_source)?);

        let aggregator = Arc::new(Aggregator::new(
            index.clone(),
            trending.clone(),
            history.clone(),
            filter.clone(),
            log_store.clone(),
            config.flush_batch_size,
            config.rebuild_cap,
        ));

        let service = SuggestionService::new(
            index.clone(),
            trending.clone(),
            history.clone(),
            filter.clone(),
            config.weights,
            config.k,
            config.lookup_deadline,
            config.cache_ttl_hot,
            config.cache_ttl_user,
            config.cache_capacity,
        );

        Ok(SuggestionEngine {
            index,
            trending,
            history,
            filter,
            aggregator,
            service,
            log_store,
            rebuild_threshold: config.rebuild_threshold,
        })
    }

    /// Read path (§4.3): ranked suggestions for a prefix.
    pub fn suggest(&self, request: SuggestRequest) -> Result<Vec<SuggestionResult>, EngineError> {
        self.service.suggest(request)
    }

    /// Write path (§4.6): log one completion. `user_id` is the durable
    /// personalization identity (drives `UserHistory`); `session_id` is the
    /// ephemeral session that produced the completion and is carried
    /// through to the query log only.
    pub fn log_completion(
        &self,
        user_id: Option<&str>,
        session_id: Option<&str>,
        raw_phrase: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let phrase = normalize_ingest(raw_phrase)?;
        self.aggregator.ingest(user_id, session_id, phrase, occurred_at)
    }

    /// Flush any pending writes and rebuild the Prefix Index from durable
    /// counts (admin `rebuild`).
    pub fn rebuild(&self) -> Result<(), EngineError> {
        self.aggregator.rebuild()
    }

    /// `true` if durable/indexed drift has crossed `N_rebuild`; background
    /// tasks poll this to decide whether to call [`Self::rebuild`].
    pub fn needs_rebuild(&self) -> Result<bool, EngineError> {
        self.aggregator.needs_rebuild(self.rebuild_threshold)
    }

    /// Set a phrase's durable and in-memory count directly (admin
    /// `upsert_phrase`).
    pub fn upsert_phrase(&self, raw_phrase: &str, count: u64) -> Result<(), EngineError> {
        let phrase = normalize_ingest(raw_phrase)?;
        let durable_current = self.log_store.count_of(&phrase)?;
        let delta = count as i64 - durable_current as i64;
        self.index.set_count(&phrase, count)?;
        if delta != 0 {
            self.log_store.apply_batch(&[(phrase, delta)], &[])?;
        }
        Ok(())
    }

    /// Remove a phrase entirely from the index and durable store (admin
    /// `delete_phrase`).
    pub fn delete_phrase(&self, raw_phrase: &str) -> Result<(), EngineError> {
        let phrase = normalize_ingest(raw_phrase)?;
        let removed_from_index = self.index.remove_phrase(&phrase);
        let durable_current = self.log_store.count_of(&phrase)?;
        if durable_current > 0 {
            self.log_store.apply_batch(&[(phrase.clone(), -(durable_current as i64))], &[])?;
        }
        if !removed_from_index && durable_current == 0 {
            return Err(EngineError::NotFound(phrase.into_string()));
        }
        Ok(())
    }

    /// Add a phrase to the blocklist (admin `filter_add`).
    pub fn filter_add(&self, raw_phrase: &str) -> Result<(), EngineError> {
        let phrase = normalize_ingest(raw_phrase)?;
        self.filter.block(phrase)?;
        Ok(())
    }

    /// Remove a phrase from the blocklist (admin `filter_remove`).
    pub fn filter_remove(&self, raw_phrase: &str) -> Result<(), EngineError> {
        let phrase = normalize_ingest(raw_phrase)?;
        if !self.filter.unblock(&phrase)? {
            return Err(EngineError::NotFound(phrase.into_string()));
        }
        Ok(())
    }

    /// Clear the suggestion cache, either entirely or scoped to a prefix
    /// (admin `cache_clear`).
    pub fn cache_clear(&self, prefix: Option<&str>) -> Result<(), EngineError> {
        match prefix {
            None => {
                self.service.cache_clear();
                Ok(())
            }
            Some(raw) if raw.trim().is_empty() => Err(EngineError::InvalidPrefix(
                "prefix must not be empty; omit it entirely to clear the whole cache".to_string(),
            )),
            Some(raw) => {
                let phrase = Phrase::normalize_lookup(raw);
                self.service.cache_clear_prefix(&phrase);
                Ok(())
            }
        }
    }

    /// Diagnostic snapshot across every component (admin `status`).
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            indexed_phrases: self.index.size(),
            index_node_count: self.index.node_count(),
            trending_tracked: self.trending.tracked_count(),
            cached_entries: self.service.cache_len(),
            blocked_phrases: self.filter.len(),
            aggregator: self.aggregator.status(),
        }
    }

    /// Drop session history older than `T_user`; called periodically by a
    /// background task.
    pub fn prune_history(&self, cutoff: DateTime<Utc>) -> Result<u64, EngineError> {
        Ok(self.history.prune_older_than(cutoff)?)
    }

    /// Flush any pending aggregator writes; called periodically by a
    /// background task (§5 `T_flush`).
    pub fn flush(&self) {
        self.aggregator.flush();
    }

    /// Currently trending phrases (admin/public `trending`), highest
    /// decayed score first.
    pub fn trending(&self, limit: usize) -> Vec<(Phrase, f64)> {
        self.trending.top(limit.max(1), Utc::now())
    }

    /// A user's recent completion history, most-recent first (public
    /// `history`). Errors with `MissingUser` if `user_id` is empty.
    pub fn history(&self, user_id: &str, limit: usize) -> Result<Vec<Phrase>, EngineError> {
        if user_id.trim().is_empty() {
            return Err(EngineError::MissingUser);
        }
        let empty_prefix = Phrase::normalize_lookup("");
        Ok(self.history.match_prefix(Some(user_id), &empty_prefix, limit.max(1))?)
    }
}

fn normalize_ingest(raw: &str) -> Result<Phrase, EngineError> {
    Phrase::normalize_ingest(raw).map_err(|e: NormalizeError| EngineError::InvalidQuery(e.to_string()))
}
