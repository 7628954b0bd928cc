//! Property-style checks of the invariants the specification calls out
//! explicitly (§8 I1-I5): index/cache correctness, deterministic
//! composition, durability, the filter gate, and the freshness bound. The
//! per-request deadline isn't one of the five numbered invariants, but gets
//! its own test alongside them since it's just as load-bearing.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use suggest_core::prelude::*;
use suggest_core::storage::memory_session::InMemorySessionStore;
use suggest_core::storage::sqlite::SqliteLogStore;
use suggest_core::store::{FilterSource, LogStore, SessionStore};
use suggest_core::trie::PrefixIndex;

fn build_engine() -> SuggestionEngine {
    let store = Arc::new(SqliteLogStore::open_in_memory().unwrap());
    let sessions = Arc::new(InMemorySessionStore::new(50));
    SuggestionEngine::new(
        EngineConfig::default(),
        store.clone() as Arc<dyn LogStore>,
        store as Arc<dyn FilterSource>,
        sessions,
    )
    .unwrap()
}

fn req(prefix: &str) -> SuggestRequest {
    SuggestRequest {
        raw_prefix: prefix.to_string(),
        user_id: None,
        k: None,
        fuzzy: false,
    }
}

/// I1: every node's top-K cache always agrees with a brute-force top-K over
/// its subtree, after an arbitrary sequence of incremental writes.
#[test]
fn i1_cache_matches_brute_force_top_k_after_incremental_writes() {
    let index = PrefixIndex::new(5);
    let phrases = [
        ("alpha", 3), ("alphabet", 7), ("alphorn", 1), ("beta", 9), ("betray", 2), ("beast", 4),
    ];
    for (phrase, count) in phrases {
        for _ in 0..count {
            index.apply_delta(&suggest_core::Phrase::normalize_lookup(phrase), 1).unwrap();
        }
    }

    let mut expected: Vec<(&str, u64)> = phrases.to_vec();
    expected.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let expected_top5: Vec<&str> = expected.iter().take(5).map(|(p, _)| *p).collect();

    let got = index.lookup(&suggest_core::Phrase::normalize_lookup(""), 5);
    let got_phrases: Vec<String> = got.iter().map(|e| e.phrase.as_str().to_string()).collect();
    assert_eq!(got_phrases, expected_top5);
}

/// I2: composing the same candidates twice, in a different order, yields
/// identical results — ranking is a pure function of its inputs.
#[test]
fn i2_suggest_is_deterministic_across_repeated_calls() {
    let engine = build_engine();
    engine.log_completion(None, None, "deterministic phrase", Utc::now()).unwrap();
    engine.log_completion(None, None, "deterministic other", Utc::now()).unwrap();

    let first = engine.suggest(req("determin")).unwrap();
    let second = engine.suggest(req("determin")).unwrap();
    assert_eq!(first, second);
}

/// I3: a completion logged and explicitly flushed is present in the
/// durable store, independent of whether the in-memory index survives.
#[test]
fn i3_flushed_completion_is_durable() {
    let store = Arc::new(SqliteLogStore::open_in_memory().unwrap());
    let sessions = Arc::new(InMemorySessionStore::new(50));
    let engine = SuggestionEngine::new(
        EngineConfig::default(),
        store.clone() as Arc<dyn LogStore>,
        store.clone() as Arc<dyn FilterSource>,
        sessions,
    )
    .unwrap();

    engine.log_completion(None, None, "written through", Utc::now()).unwrap();
    engine.flush();

    let counts = store.load_all_counts(100).unwrap();
    assert!(counts.iter().any(|c| c.phrase.as_str() == "written through" && c.count == 1));
}

/// I4: the Filter Gate excludes a blocked phrase even when it would
/// otherwise be the single highest-scoring candidate.
#[test]
fn i4_filter_gate_excludes_regardless_of_score() {
    let engine = build_engine();
    for _ in 0..10_000 {
        engine.log_completion(None, None, "overwhelming favorite", Utc::now()).unwrap();
    }
    engine.log_completion(None, None, "overwhelming alternative", Utc::now()).unwrap();
    engine.filter_add("overwhelming favorite").unwrap();

    let results = engine.suggest(req("overwhelming")).unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.phrase.as_str() != "overwhelming favorite"));
}

/// I5: a completed query is reflected in suggestions within `T_freshness` +
/// `T_flush` (§4.3). The engine's ingest pipeline updates the Prefix Index
/// synchronously, so a lookup right after `log_completion` — well inside
/// either bound — already reflects the increment, without waiting for a
/// flush cycle.
#[test]
fn i5_freshness_bound_is_met_without_waiting_for_a_flush() {
    let engine = build_engine();
    engine.log_completion(None, None, "freshly completed phrase", Utc::now()).unwrap();

    let results = engine.suggest(req("freshly")).unwrap();
    assert!(results.iter().any(|r| r.phrase.as_str() == "freshly completed phrase"));
}

/// A lookup deadline of zero is exceeded by any nontrivial amount of work,
/// surfacing as `DeadlineExceeded` rather than a silently slow response.
#[test]
fn deadline_exceeded_is_reported_when_work_cannot_finish_in_time() {
    let store = Arc::new(SqliteLogStore::open_in_memory().unwrap());
    let sessions = Arc::new(InMemorySessionStore::new(50));
    let mut config = EngineConfig::default();
    config.lookup_deadline = Duration::from_nanos(0);
    let engine = SuggestionEngine::new(
        config,
        store.clone() as Arc<dyn LogStore>,
        store as Arc<dyn FilterSource>,
        sessions,
    )
    .unwrap();
    engine.log_completion(None, None, "slow path phrase", Utc::now()).unwrap();

    let err = engine.suggest(req("slow")).unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
}
