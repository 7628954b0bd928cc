//! The History Tracker (§4.5): per-user completion history and the
//! personalization signal derived from it. Keyed by `user_id`, the durable
//! personalization identity (§3 `UserHistory`) — distinct from the
//! ephemeral `session_id` the Aggregator also logs alongside a completion.
//!
//! Backed by a [`SessionStore`], which owns the newest-first, de-duplicated
//! ordering (§3 `UserHistory`: duplicates move to the head rather than
//! inserting again). This module owns only the scoring formula: a fixed
//! per-rank decay, not a time-based one, per §4.5's `exp(-age_rank * 0.1)`.

use crate::store::SessionStore;
use crate::{Phrase, StoreError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Decay applied per rank step in [`HistoryTracker::personal_scores`] (§4.5:
/// `personal_score = exp(-age_rank * 0.1)`).
const AGE_RANK_DECAY: f64 = 0.1;

/// Computes personalization scores from a session's recent completion
/// history.
pub struct HistoryTracker {
    store: Arc<dyn SessionStore>,
    /// `H`: how many recent entries per session inform scoring.
    max_entries: usize,
}

impl HistoryTracker {
    /// `max_entries` is `H` (§5 default 50).
    pub fn new(store: Arc<dyn SessionStore>, max_entries: usize) -> Self {
        HistoryTracker { store, max_entries }
    }

    /// Record a completion for `user_id` (§4.6 ingest step).
    pub fn record(&self, user_id: &str, phrase: Phrase, occurred_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.store.record(user_id, phrase, occurred_at)
    }

    /// The user's history entries beginning with `prefix`, most-recent
    /// first, capped at `k` (§4.5 `match`). `user_id = None` always yields
    /// an empty list.
    pub fn match_prefix(&self, user_id: Option<&str>, prefix: &Phrase, k: usize) -> Result<Vec<Phrase>, StoreError> {
        let Some(user_id) = user_id else {
            return Ok(Vec::new());
        };
        let entries = self.store.recent(user_id, self.max_entries)?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.phrase.as_str().starts_with(prefix.as_str()))
            .take(k)
            .map(|entry| entry.phrase)
            .collect())
    }

    /// Personalization score for every phrase in `candidates` that appears
    /// in the user's recent history, keyed by phrase. Phrases with no match
    /// are absent rather than present with a zero score, so callers can
    /// distinguish "no signal" from "scored to exactly zero".
    ///
    /// `age_rank` is the entry's position in the recency-ordered history (0
    /// = most recent), per §4.5; `user_id = None` (anonymous request)
    /// always yields an empty map.
    pub fn personal_scores(
        &self,
        user_id: Option<&str>,
        candidates: &[Phrase],
    ) -> Result<HashMap<Phrase, f64>, StoreError> {
        let Some(user_id) = user_id else {
            return Ok(HashMap::new());
        };
        let entries = self.store.recent(user_id, self.max_entries)?;
        let mut scores: HashMap<Phrase, f64> = HashMap::new();
        for (age_rank, entry) in entries.iter().enumerate() {
            if !candidates.contains(&entry.phrase) {
                continue;
            }
            // The store's contract dedups by phrase, so each phrase should
            // appear at most once; keep the first (most recent) match if it
            // somehow didn't.
            scores
                .entry(entry.phrase.clone())
                .or_insert_with(|| (-AGE_RANK_DECAY * age_rank as f64).exp());
        }
        Ok(scores)
    }

    /// Drop history older than `T_user` across all users.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.store.prune_older_than(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_session::InMemorySessionStore;

    fn p(s: &str) -> Phrase {
        Phrase::normalize_lookup(s)
    }

    fn now() -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::days(1000)
    }

    #[test]
    fn more_recent_completion_outscores_older_one() {
        let store = Arc::new(InMemorySessionStore::new(100));
        let tracker = HistoryTracker::new(store, 50);
        tracker.record("s1", p("sushi"), now()).unwrap();
        tracker.record("s1", p("pizza"), now() + chrono::Duration::seconds(1)).unwrap();

        let scores = tracker
            .personal_scores(Some("s1"), &[p("pizza"), p("sushi")])
            .unwrap();
        assert!(scores[&p("pizza")] > scores[&p("sushi")]);
    }

    #[test]
    fn unmatched_candidate_is_absent_not_zero() {
        let store = Arc::new(InMemorySessionStore::new(100));
        let tracker = HistoryTracker::new(store, 50);
        tracker.record("s1", p("pizza"), now()).unwrap();

        let scores = tracker.personal_scores(Some("s1"), &[p("sushi")]).unwrap();
        assert!(!scores.contains_key(&p("sushi")));
    }

    #[test]
    fn anonymous_session_has_no_personalization() {
        let store = Arc::new(InMemorySessionStore::new(100));
        let tracker = HistoryTracker::new(store, 50);
        let scores = tracker.personal_scores(None, &[p("pizza")]).unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn most_recent_entry_scores_exactly_one() {
        let store = Arc::new(InMemorySessionStore::new(100));
        let tracker = HistoryTracker::new(store, 50);
        tracker.record("s1", p("pizza"), now()).unwrap();
        let score = tracker.personal_scores(Some("s1"), &[p("pizza")]).unwrap()[&p("pizza")];
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn match_prefix_filters_and_orders_by_recency() {
        let store = Arc::new(InMemorySessionStore::new(100));
        let tracker = HistoryTracker::new(store, 50);
        tracker.record("s1", p("banana split"), now()).unwrap();
        tracker.record("s1", p("band practice"), now() + chrono::Duration::seconds(1)).unwrap();
        tracker.record("s1", p("apple pie"), now() + chrono::Duration::seconds(2)).unwrap();

        let matches = tracker.match_prefix(Some("s1"), &p("ban"), 10).unwrap();
        assert_eq!(matches, vec![p("band practice"), p("banana split")]);
    }

    #[test]
    fn match_prefix_is_empty_for_anonymous_session() {
        let store = Arc::new(InMemorySessionStore::new(100));
        let tracker = HistoryTracker::new(store, 50);
        tracker.record("s1", p("pizza"), now()).unwrap();
        assert!(tracker.match_prefix(None, &p("piz"), 10).unwrap().is_empty());
    }
}
