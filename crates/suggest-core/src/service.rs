//! The Suggestion Service (§4.3): the read path from a raw prefix to ranked
//! suggestions, with a read-through cache in front of the Ranking Composer.
//!
//! Pipeline: normalize the prefix, check the cache, look up candidates in
//! the Prefix Index (optionally expanded by single-edit fuzzy variants),
//! drop anything the Filter Gate blocks, gather trending and
//! personalization signals, compose, cache, return. Every stage checks the
//! per-request deadline so a slow flush or a cold cache can't make a
//! lookup hang indefinitely (§5 deadline).

use crate::error::EngineError;
use crate::filter::FilterGate;
use crate::history::HistoryTracker;
use crate::ranking::{compose, Candidate, RankingWeights, SuggestionResult};
use crate::trending::TrendingTracker;
use crate::trie::PrefixIndex;
use crate::Phrase;
use chrono::Utc;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A single `suggest` request.
#[derive(Debug, Clone)]
pub struct SuggestRequest {
    /// Raw, not-yet-normalized prefix text as typed by the user.
    pub raw_prefix: String,
    /// User identifier for personalization; `None` for an anonymous request
    /// (no personalization signal, no history considered). This is the same
    /// durable `user_id` the History Tracker keys `UserHistory` on, not a
    /// transient session identifier.
    pub user_id: Option<String>,
    /// Number of suggestions to return; falls back to the engine default
    /// if `None` or `0`.
    pub k: Option<usize>,
    /// Whether to also consider single-edit variants of the prefix (§4.3
    /// fuzzy mode). Only applied when the normalized prefix has at least
    /// three characters, since shorter prefixes already match broadly.
    pub fuzzy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    prefix: Phrase,
    user_id: Option<String>,
    fuzzy: bool,
}

struct CachedSuggestions {
    results: Vec<SuggestionResult>,
    inserted_at: Instant,
    ttl: Duration,
}

/// Minimum normalized prefix length fuzzy expansion is applied at.
const FUZZY_MIN_CHARS: usize = 3;

/// Read path: normalized prefix to ranked, cached suggestions.
pub struct SuggestionService {
    index: Arc<PrefixIndex>,
    trending: Arc<TrendingTracker>,
    history: Arc<HistoryTracker>,
    filter: Arc<FilterGate>,
    weights: RankingWeights,
    k_default: usize,
    deadline: Duration,
    cache_ttl_hot: Duration,
    cache_ttl_user: Duration,
    cache: Mutex<LruCache<CacheKey, CachedSuggestions>>,
}

impl SuggestionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: Arc<PrefixIndex>,
        trending: Arc<TrendingTracker>,
        history: Arc<HistoryTracker>,
        filter: Arc<FilterGate>,
        weights: RankingWeights,
        k_default: usize,
        deadline: Duration,
        cache_ttl_hot: Duration,
        cache_ttl_user: Duration,
        cache_capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        SuggestionService {
            index,
            trending,
            history,
            filter,
            weights,
            k_default,
            deadline,
            cache_ttl_hot,
            cache_ttl_user,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Serve one suggestion request.
    pub fn suggest(&self, request: SuggestRequest) -> Result<Vec<SuggestionResult>, EngineError> {
        let start = Instant::now();
        let prefix = Phrase::normalize_lookup(&request.raw_prefix);
        let k = request.k.filter(|&k| k > 0).unwrap_or(self.k_default);

        let cache_key = CacheKey {
            prefix: prefix.clone(),
            user_id: request.user_id.clone(),
            fuzzy: request.fuzzy,
        };
        if let Some(cached) = self.cache_get(&cache_key) {
            return Ok(cached.into_iter().take(k).collect());
        }

        self.check_deadline(start)?;

        // Overfetch so that dropping blocked phrases still leaves >= k
        // candidates in the common case.
        let fetch_k = k.saturating_mul(4).max(k);
        let now = Utc::now();

        // Union the three signal sources (§4.2 Inputs): the Index's top-K,
        // the Trending Tracker's top-K for the prefix, and the History
        // Tracker's personal matches for the prefix. A phrase found only
        // via trending or personal history (not yet indexed, or indexed
        // below the cache cutoff) still enters composition with count 0.
        let mut candidate_set: HashSet<Phrase> = HashSet::new();
        for entry in self.index.lookup(&prefix, fetch_k) {
            candidate_set.insert(entry.phrase);
        }
        if request.fuzzy && prefix.char_len() >= FUZZY_MIN_CHARS {
            for variant in fuzzy_variants(prefix.as_str()) {
                let variant_phrase = Phrase::normalize_lookup(&variant);
                for entry in self.index.lookup(&variant_phrase, fetch_k) {
                    candidate_set.insert(entry.phrase);
                }
            }
        }
        for (phrase, _) in self.trending.top_matching_prefix(&prefix, fetch_k, now) {
            candidate_set.insert(phrase);
        }
        for phrase in self.history.match_prefix(request.user_id.as_deref(), &prefix, fetch_k)? {
            candidate_set.insert(phrase);
        }

        self.check_deadline(start)?;

        let blocked = self.filter.current();
        let candidate_phrases: Vec<Phrase> = candidate_set.into_iter().filter(|p| !blocked.contains(p)).collect();

        let personal = self.history.personal_scores(request.user_id.as_deref(), &candidate_phrases)?;

        self.check_deadline(start)?;

        let candidates: Vec<Candidate> = candidate_phrases
            .into_iter()
            .map(|phrase| {
                let count = self.index.count_of(&phrase).unwrap_or(0);
                let trending_score = self.trending.score(&phrase, now);
                let personal_score = personal.get(&phrase).copied().unwrap_or(0.0);
                Candidate {
                    phrase,
                    count,
                    trending_score,
                    personal_score,
                }
            })
            .collect();

        let results = compose(candidates, &self.weights, k);

        self.check_deadline(start)?;

        let ttl = if request.user_id.is_some() {
            self.cache_ttl_user
        } else {
            self.cache_ttl_hot
        };
        self.cache_put(cache_key, results.clone(), ttl);
        Ok(results)
    }

    fn check_deadline(&self, start: Instant) -> Result<(), EngineError> {
        let elapsed = start.elapsed();
        if elapsed > self.deadline {
            return Err(EngineError::DeadlineExceeded {
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        Ok(())
    }

    fn cache_get(&self, key: &CacheKey) -> Option<Vec<SuggestionResult>> {
        let mut cache = self.cache.lock().expect("suggestion cache lock poisoned");
        let expired = match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < entry.ttl => return Some(entry.results.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        None
    }

    fn cache_put(&self, key: CacheKey, results: Vec<SuggestionResult>, ttl: Duration) {
        let mut cache = self.cache.lock().expect("suggestion cache lock poisoned");
        cache.put(
            key,
            CachedSuggestions {
                results,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Drop every cached entry (admin `cache_clear`).
    pub fn cache_clear(&self) {
        self.cache.lock().expect("suggestion cache lock poisoned").clear();
    }

    /// Drop cached entries whose normalized prefix starts with `prefix`
    /// (admin `cache_clear` scoped to a phrase, §9 open question: matched
    /// against the normalized first character(s), not the raw request text).
    pub fn cache_clear_prefix(&self, prefix: &Phrase) {
        let mut cache = self.cache.lock().expect("suggestion cache lock poisoned");
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(key, _)| key.prefix.as_str().starts_with(prefix.as_str()))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    /// Number of entries currently cached (diagnostic; exposed via admin
    /// `status`).
    pub fn cache_len(&self) -> usize {
        self.cache.lock().expect("suggestion cache lock poisoned").len()
    }
}

/// Every phrase reachable from `prefix` by a single deletion, insertion, or
/// substitution of the last character (§4.3), plus a transposition of the
/// last two characters (needed to reach a phrase like `apple` from a typo
/// like `aplp`, per §8). Edits are scoped to the last character only: an
/// edit anywhere earlier in the prefix would mean reinterpreting text the
/// user already typed and confirmed, not just their most recent keystroke.
fn fuzzy_variants(prefix: &str) -> Vec<String> {
    let chars: Vec<char> = prefix.chars().collect();
    let mut variants = Vec::with_capacity(2 * 26 + 2);
    let Some(&last) = chars.last() else {
        return variants;
    };
    let without_last = &chars[..chars.len() - 1];

    // deletion of the last character
    variants.push(without_last.iter().collect());

    // insertion of a character after the last one
    for c in 'a'..='z' {
        let mut inserted: Vec<char> = chars.clone();
        inserted.push(c);
        variants.push(inserted.into_iter().collect());
    }

    // substitution of the last character
    for c in 'a'..='z' {
        if c == last {
            continue;
        }
        let mut substituted: Vec<char> = without_last.to_vec();
        substituted.push(c);
        variants.push(substituted.into_iter().collect());
    }

    // transposition of the last two characters
    if chars.len() >= 2 {
        let mut transposed = chars.clone();
        let last_idx = transposed.len() - 1;
        transposed.swap(last_idx - 1, last_idx);
        variants.push(transposed.into_iter().collect());
    }

    variants
}
