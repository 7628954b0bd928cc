//! End-to-end scenarios exercising the engine as a single black box: only
//! the public [`SuggestionEngine`] API is used, the way an embedding
//! application would use it.

use chrono::{Duration, Utc};
use std::sync::Arc;
use suggest_core::prelude::*;
use suggest_core::storage::memory_session::InMemorySessionStore;
use suggest_core::storage::sqlite::SqliteLogStore;
use suggest_core::store::{FilterSource, LogStore, SessionStore};

fn fresh_engine() -> (SuggestionEngine, Arc<SqliteLogStore>) {
    let store = Arc::new(SqliteLogStore::open_in_memory().unwrap());
    let sessions = Arc::new(InMemorySessionStore::new(50));
    let engine = SuggestionEngine::new(
        EngineConfig::default(),
        store.clone() as Arc<dyn LogStore>,
        store.clone() as Arc<dyn FilterSource>,
        sessions,
    )
    .unwrap();
    (engine, store)
}

fn req(prefix: &str) -> SuggestRequest {
    SuggestRequest {
        raw_prefix: prefix.to_string(),
        user_id: None,
        k: None,
        fuzzy: false,
    }
}

/// Seeds the durable counts §8's scenarios share: `apple=10`,
/// `application=5`, `apricot=7`.
fn seed_apple_application_apricot(engine: &SuggestionEngine) {
    engine.upsert_phrase("apple", 10).unwrap();
    engine.upsert_phrase("application", 5).unwrap();
    engine.upsert_phrase("apricot", 7).unwrap();
}

/// Scenario 1 (§8): an empty prefix against the seeded counts returns the
/// three phrases ordered by popularity alone, highest count first.
#[test]
fn scenario_1_empty_prefix_returns_phrases_ordered_by_popularity() {
    let (engine, _store) = fresh_engine();
    seed_apple_application_apricot(&engine);

    let results = engine
        .suggest(SuggestRequest { raw_prefix: String::new(), user_id: None, k: Some(3), fuzzy: false })
        .unwrap();
    let order: Vec<&str> = results.iter().map(|r| r.phrase.as_str()).collect();
    assert_eq!(order, vec!["apple", "apricot", "application"]);
}

/// Scenario 2 (§8): narrowing the prefix to `app` drops `apricot`, which
/// doesn't share it, leaving `apple` ahead of `application`.
#[test]
fn scenario_2_prefix_narrowing_excludes_non_matching_phrases() {
    let (engine, _store) = fresh_engine();
    seed_apple_application_apricot(&engine);

    let results = engine
        .suggest(SuggestRequest { raw_prefix: "app".to_string(), user_id: None, k: Some(3), fuzzy: false })
        .unwrap();
    let order: Vec<&str> = results.iter().map(|r| r.phrase.as_str()).collect();
    assert_eq!(order, vec!["apple", "application"]);
}

/// Scenario 3 (§8): once `application` is blocked, it is dropped from
/// `suggest("app")` even though logging it afterward still reaches the
/// audit log — just never the index.
#[test]
fn scenario_3_a_blocked_phrase_is_excluded_and_further_completions_skip_the_index() {
    let (engine, _store) = fresh_engine();
    seed_apple_application_apricot(&engine);
    engine.filter_add("application").unwrap();

    let results = engine
        .suggest(SuggestRequest { raw_prefix: "app".to_string(), user_id: None, k: Some(3), fuzzy: false })
        .unwrap();
    let order: Vec<&str> = results.iter().map(|r| r.phrase.as_str()).collect();
    assert_eq!(order, vec!["apple"]);

    engine.log_completion(None, None, "application", Utc::now()).unwrap();
    let results = engine
        .suggest(SuggestRequest { raw_prefix: "app".to_string(), user_id: None, k: Some(3), fuzzy: false })
        .unwrap();
    assert!(results.iter().all(|r| r.phrase.as_str() != "application"));
}

/// Scenario 4 (§8): a burst of `apricot` completions, once flushed, raises
/// its durable count to 12 and moves it above `application` for the `ap`
/// prefix — the freshness bound is met as soon as the batch is durable.
#[test]
fn scenario_4_a_burst_of_completions_raises_apricot_above_application() {
    let (engine, store) = fresh_engine();
    seed_apple_application_apricot(&engine);

    let now = Utc::now();
    for _ in 0..5 {
        engine.log_completion(None, None, "apricot", now).unwrap();
    }
    engine.flush();
    assert_eq!(store.count_of(&suggest_core::Phrase::normalize_lookup("apricot")).unwrap(), 12);

    let results = engine
        .suggest(SuggestRequest { raw_prefix: "ap".to_string(), user_id: None, k: Some(3), fuzzy: false })
        .unwrap();
    let apricot_rank = results.iter().position(|r| r.phrase.as_str() == "apricot").unwrap();
    let application_rank = results.iter().position(|r| r.phrase.as_str() == "application").unwrap();
    assert!(apricot_rank < application_rank);
}

/// Scenario 5 (§8): user `U`'s history (`banana`, then `application`)
/// personalizes `suggest("app", user=U)` enough to outrank the more popular
/// `apple`, even though `application`'s durable count is pinned at 5 — the
/// history-building completions are re-pinned back to the seeded counts
/// afterward since recording history and logging a completion share one
/// ingest pipeline.
#[test]
fn scenario_5_a_users_history_personalizes_results_above_raw_popularity() {
    let (engine, _store) = fresh_engine();
    seed_apple_application_apricot(&engine);

    let now = Utc::now();
    engine.log_completion(Some("U"), None, "banana", now).unwrap();
    engine.log_completion(Some("U"), None, "application", now + Duration::seconds(1)).unwrap();
    seed_apple_application_apricot(&engine);

    let personalized = engine
        .suggest(SuggestRequest {
            raw_prefix: "app".to_string(),
            user_id: Some("U".to_string()),
            k: Some(3),
            fuzzy: false,
        })
        .unwrap();
    let order: Vec<&str> = personalized.iter().map(|r| r.phrase.as_str()).collect();
    assert_eq!(order, vec!["application", "apple"]);
}

/// Scenario 6 (§8): `suggest("aplp", fuzzy=true)` reaches `apple` through
/// the last-two-character transposition expansion (`aplp` -> `appl`, a
/// prefix of `apple`).
#[test]
fn scenario_6_fuzzy_fallback_reaches_apple_via_transposition() {
    let (engine, _store) = fresh_engine();
    engine.upsert_phrase("apple", 10).unwrap();

    let results = engine
        .suggest(SuggestRequest { raw_prefix: "aplp".to_string(), user_id: None, k: Some(3), fuzzy: true })
        .unwrap();
    assert_eq!(results[0].phrase.as_str(), "apple");
}
