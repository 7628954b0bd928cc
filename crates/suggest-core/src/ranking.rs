//! The Ranking Composer (§4.2): a pure function blending popularity,
//! trending, and personalization signals into a single score per candidate.
//!
//! Grounded on the linear-combination and reciprocal-rank-fusion scoring in
//! `search::hybrid` (see DESIGN.md), generalized from two signals to three
//! and from a fixed 0.5/0.5 split to configurable weights.

use crate::Phrase;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Per-candidate blend weights (§5 defaults: `w_pop = 1.0`, `w_trend = 0.6`,
/// `w_personal = 1.5`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub w_pop: f64,
    pub w_trend: f64,
    pub w_personal: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        RankingWeights {
            w_pop: 1.0,
            w_trend: 0.6,
            w_personal: 1.5,
        }
    }
}

/// One phrase's raw signals, gathered from the Prefix Index, Trending
/// Tracker, and History Tracker before composition.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub phrase: Phrase,
    /// Durable completion count from the Prefix Index.
    pub count: u64,
    /// Sliding-window decayed trending score (§4.4), already normalized to
    /// a comparable scale by the Trending Tracker.
    pub trending_score: f64,
    /// Session-local personalization score (§4.5); zero for an unknown or
    /// anonymous session.
    pub personal_score: f64,
}

/// Which ranking signal(s) contributed a non-zero addend to a result's score
/// (§3 `SuggestionResult.sources`) — useful for tests and debugging, not for
/// ranking itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    Popular,
    Trending,
    Personal,
}

/// A ranked suggestion: a phrase, the composed score that placed it, and
/// which signals contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionResult {
    pub phrase: Phrase,
    pub score: f64,
    pub sources: BTreeSet<Source>,
}

/// Blend every candidate's signals into a single score, sort descending, and
/// keep the top `k`.
///
/// `score = w_pop * ln(1 + count) + w_trend * trending_score + w_personal *
/// personal_score`. Ties break on the phrase itself so that composition is a
/// pure, deterministic function of its inputs regardless of candidate
/// iteration order (§8 I2).
pub fn compose(candidates: Vec<Candidate>, weights: &RankingWeights, k: usize) -> Vec<SuggestionResult> {
    let mut scored: Vec<SuggestionResult> = candidates
        .into_iter()
        .map(|c| {
            let score = weights.w_pop * (c.count as f64).ln_1p()
                + weights.w_trend * c.trending_score
                + weights.w_personal * c.personal_score;
            let mut sources = BTreeSet::new();
            if c.count > 0 {
                sources.insert(Source::Popular);
            }
            if c.trending_score > 0.0 {
                sources.insert(Source::Trending);
            }
            if c.personal_score > 0.0 {
                sources.insert(Source::Personal);
            }
            SuggestionResult { phrase: c.phrase, score, sources }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.phrase.cmp(&b.phrase))
    });
    scored.truncate(k);
    scored
}
