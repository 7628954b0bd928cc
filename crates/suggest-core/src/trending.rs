//! The Trending Tracker (§4.4): a sliding-window exponential-decay score per
//! phrase, approximated without retaining individual event timestamps.
//!
//! Grounded on the decayed-frequency scoring and amortized top-N eviction in
//! `user_history`'s `TopNTracker` (see DESIGN.md): instead of a live heap
//! rebalanced on every update, each phrase carries a single decayed score
//! and a last-updated timestamp, and the tracked set is pruned back down to
//! `N_trend` entries only periodically, not on every bump.

use crate::Phrase;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Decayed scores below this are treated as noise and evicted on prune.
const SCORE_EPSILON: f64 = 1e-6;

struct DecayEntry {
    /// Score as of `last_updated`; callers must re-decay to "now" to read it.
    score: f64,
    last_updated: DateTime<Utc>,
}

struct State {
    entries: HashMap<Phrase, DecayEntry>,
    last_pruned_at: DateTime<Utc>,
}

/// Tracks a decayed "recent popularity" score per phrase over a sliding
/// window `W`, with half-life `W / 2` (§5 default `W = 60min`).
pub struct TrendingTracker {
    state: Mutex<State>,
    lambda: f64,
    top_n: usize,
    prune_interval: chrono::Duration,
}

impl TrendingTracker {
    /// `window` sets the decay half-life (`window / 2`); `top_n` bounds the
    /// number of phrases retained across prune passes (`N_trend`).
    pub fn new(window: chrono::Duration, top_n: usize, now: DateTime<Utc>) -> Self {
        let half_life_secs = (window.num_milliseconds() as f64 / 2.0) / 1000.0;
        let lambda = std::f64::consts::LN_2 / half_life_secs.max(1e-6);
        TrendingTracker {
            state: Mutex::new(State {
                entries: HashMap::new(),
                last_pruned_at: now,
            }),
            lambda,
            top_n,
            // Prune at most once per tenth of the window; frequent enough to
            // bound memory, rare enough to stay amortized.
            prune_interval: window / 10,
        }
    }

    fn decay_to(&self, entry: &DecayEntry, now: DateTime<Utc>) -> f64 {
        let elapsed_secs = (now - entry.last_updated).num_milliseconds() as f64 / 1000.0;
        if elapsed_secs <= 0.0 {
            return entry.score;
        }
        entry.score * (-self.lambda * elapsed_secs).exp()
    }

    /// Record one completion of `phrase` at `now`.
    pub fn bump(&self, phrase: &Phrase, now: DateTime<Utc>) {
        let mut state = self.state.lock().expect("trending tracker lock poisoned");
        let decayed = state
            .entries
            .get(phrase)
            .map(|e| self.decay_to(e, now))
            .unwrap_or(0.0);
        state.entries.insert(
            phrase.clone(),
            DecayEntry {
                score: decayed + 1.0,
                last_updated: now,
            },
        );
        maybe_prune(&mut state, self.lambda, self.top_n, self.prune_interval, now);
    }

    /// Current decayed score for `phrase`, without mutating tracker state.
    pub fn score(&self, phrase: &Phrase, now: DateTime<Utc>) -> f64 {
        let state = self.state.lock().expect("trending tracker lock poisoned");
        state
            .entries
            .get(phrase)
            .map(|e| self.decay_to(e, now))
            .unwrap_or(0.0)
    }

    /// The `k` currently-trending phrases, highest decayed score first.
    pub fn top(&self, k: usize, now: DateTime<Utc>) -> Vec<(Phrase, f64)> {
        let state = self.state.lock().expect("trending tracker lock poisoned");
        let mut scored: Vec<(Phrase, f64)> = state
            .entries
            .iter()
            .map(|(p, e)| (p.clone(), self.decay_to(e, now)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    /// The `k` currently-trending phrases beginning with `prefix`, highest
    /// decayed score first (§4.2 Composer input: "the Trending Tracker's
    /// top-K for the prefix").
    pub fn top_matching_prefix(&self, prefix: &Phrase, k: usize, now: DateTime<Utc>) -> Vec<(Phrase, f64)> {
        let state = self.state.lock().expect("trending tracker lock poisoned");
        let mut scored: Vec<(Phrase, f64)> = state
            .entries
            .iter()
            .filter(|(p, _)| p.as_str().starts_with(prefix.as_str()))
            .map(|(p, e)| (p.clone(), self.decay_to(e, now)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    /// Number of phrases currently tracked (diagnostic; exposed via admin
    /// `status`).
    pub fn tracked_count(&self) -> usize {
        self.state.lock().expect("trending tracker lock poisoned").entries.len()
    }
}

fn maybe_prune(
    state: &mut State,
    lambda: f64,
    top_n: usize,
    prune_interval: chrono::Duration,
    now: DateTime<Utc>,
) {
    if now - state.last_pruned_at < prune_interval {
        return;
    }
    state.last_pruned_at = now;

    for entry in state.entries.values_mut() {
        let elapsed_secs = (now - entry.last_updated).num_milliseconds() as f64 / 1000.0;
        if elapsed_secs > 0.0 {
            entry.score *= (-lambda * elapsed_secs).exp();
            entry.last_updated = now;
        }
    }
    state.entries.retain(|_, e| e.score > SCORE_EPSILON);

    if state.entries.len() > top_n {
        let mut by_score: Vec<(Phrase, f64)> = state.entries.iter().map(|(p, e)| (p.clone(), e.score)).collect();
        by_score.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (phrase, _) in by_score.into_iter().skip(top_n) {
            state.entries.remove(&phrase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(offset_secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(offset_secs)
    }

    fn p(s: &str) -> Phrase {
        Phrase::normalize_lookup(s)
    }

    #[test]
    fn bump_increases_score() {
        let tracker = TrendingTracker::new(chrono::Duration::minutes(60), 1000, t(0));
        tracker.bump(&p("soup"), t(0));
        let first = tracker.score(&p("soup"), t(0));
        tracker.bump(&p("soup"), t(0));
        let second = tracker.score(&p("soup"), t(0));
        assert!(second > first);
    }

    #[test]
    fn score_decays_toward_zero_over_time() {
        let tracker = TrendingTracker::new(chrono::Duration::minutes(60), 1000, t(0));
        tracker.bump(&p("soup"), t(0));
        let immediate = tracker.score(&p("soup"), t(0));
        let half_life_later = tracker.score(&p("soup"), t(30 * 60));
        assert!((half_life_later - immediate / 2.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_phrase_scores_zero() {
        let tracker = TrendingTracker::new(chrono::Duration::minutes(60), 1000, t(0));
        assert_eq!(tracker.score(&p("nothing"), t(0)), 0.0);
    }

    #[test]
    fn top_matching_prefix_excludes_non_matching_phrases() {
        let tracker = TrendingTracker::new(chrono::Duration::minutes(60), 1000, t(0));
        tracker.bump(&p("pizza hut"), t(0));
        tracker.bump(&p("sushi bar"), t(0));
        let results = tracker.top_matching_prefix(&p("pizza"), 10, t(0));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, p("pizza hut"));
    }

    #[test]
    fn top_n_cap_is_enforced_on_prune() {
        let window = chrono::Duration::minutes(60);
        let tracker = TrendingTracker::new(window, 2, t(0));
        tracker.bump(&p("a"), t(0));
        tracker.bump(&p("b"), t(0));
        tracker.bump(&p("b"), t(0));
        tracker.bump(&p("c"), t(0));
        tracker.bump(&p("c"), t(0));
        tracker.bump(&p("c"), t(0));
        // Force a prune pass well past the prune interval.
        tracker.bump(&p("c"), t(10_000));
        assert!(tracker.tracked_count() <= 2);
    }
}
