//! Storage collaborators (§6 External Interfaces).
//!
//! The engine declares three narrow traits instead of depending on any
//! particular database: [`LogStore`] durably persists aggregated counts and
//! the raw query log, [`SessionStore`] persists per-session completion
//! history, and [`FilterSource`] persists the blocked-phrase set. Each trait
//! has exactly one reference implementation in [`crate::storage`]; callers
//! outside this crate are free to supply their own.
//!
//! All three are synchronous. The engine's background tasks call them from
//! inside `tokio::spawn`ed loops rather than requiring `async fn` in a trait.

use crate::Phrase;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Error surfaced by a [`LogStore`], [`SessionStore`], or [`FilterSource`]
/// implementation.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database rejected a query or connection.
    #[error("database error: {0}")]
    Database(String),

    /// The store's backing file or directory could not be created or opened.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The store is temporarily unavailable (e.g. pool exhausted).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "sqlite-store")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// A phrase and its durable completion count, as loaded during a full
/// rebuild of the Prefix Index (§4.1 `rebuild`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseCount {
    /// The normalized phrase.
    pub phrase: Phrase,
    /// Total number of completions ever logged for this phrase.
    pub count: u64,
}

/// One row of the raw query log the Aggregator appends to before folding
/// counts into the Prefix Index (§4.6). Carries both identities the
/// `query_logs` schema names: `user_id` is the durable personalization
/// identity the History Tracker keys on, `session_id` is the ephemeral
/// session that produced the completion. Either, both, or neither may be
/// present on a given request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLogRecord {
    /// The durable user identity that produced this completion, if known.
    pub user_id: Option<String>,
    /// The session that produced this completion, if known.
    pub session_id: Option<String>,
    /// The normalized phrase the user completed.
    pub phrase: Phrase,
    /// When the completion was logged.
    pub occurred_at: DateTime<Utc>,
}

/// One entry of a session's completion history, as read back for
/// personalization scoring (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// The normalized phrase the user previously completed.
    pub phrase: Phrase,
    /// When the completion happened.
    pub occurred_at: DateTime<Utc>,
}

/// Durable storage for aggregated phrase counts and the raw query log.
///
/// The reference implementation is [`crate::storage::sqlite::SqliteLogStore`].
pub trait LogStore: Send + Sync {
    /// Apply a batch of `(phrase, count delta)` pairs atomically, and append
    /// the corresponding query log records in the same transaction. This is
    /// the durability boundary the Aggregator's flush loop writes through
    /// (§8 I3: a logged completion survives a restart once this returns Ok).
    fn apply_batch(
        &self,
        deltas: &[(Phrase, i64)],
        log: &[QueryLogRecord],
    ) -> Result<(), StoreError>;

    /// Load up to `limit` phrases with a non-zero durable count, for a full
    /// index rebuild (§4.1 `rebuild`, §5 `N_rebuild`), highest count first so
    /// a capped load still keeps the most popular phrases.
    fn load_all_counts(&self, limit: u64) -> Result<Vec<PhraseCount>, StoreError>;

    /// Total number of distinct phrases with a non-zero durable count.
    fn phrase_count(&self) -> Result<u64, StoreError>;

    /// Durable count for one phrase, `0` if never logged. Used by admin
    /// `upsert_phrase`/`delete_phrase` to compute the delta that brings the
    /// durable store in line with an explicit absolute count.
    fn count_of(&self, phrase: &Phrase) -> Result<u64, StoreError>;
}

/// Durable (or in-memory) storage for per-user completion history, used by
/// the History Tracker (§4.5) to compute personalization scores. Keyed by
/// `user_id` (§3 `UserHistory`: namespace `user_history:<user_id>`), not by
/// the ephemeral session that happened to produce a given completion.
///
/// The reference implementation is
/// [`crate::storage::memory_session::InMemorySessionStore`].
pub trait SessionStore: Send + Sync {
    /// Record a completion for a user. Implementations may cap the number
    /// of entries retained per user at `H` (§5 `T_user`/`H` parameters); the
    /// caller does not assume unbounded retention.
    fn record(&self, user_id: &str, phrase: Phrase, occurred_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// The most recent entries for a user, most recent first, capped at
    /// `limit`.
    fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Drop entries older than `cutoff` across all users (`T_user` expiry,
    /// §5).
    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Durable storage for the blocked-phrase set (§4.7 Filter Gate).
///
/// The reference implementation is
/// [`crate::storage::sqlite::SqliteLogStore`], which also backs [`LogStore`].
pub trait FilterSource: Send + Sync {
    /// Load the full blocklist at startup.
    fn load_all(&self) -> Result<HashSet<Phrase>, StoreError>;

    /// Persist an addition to the blocklist.
    fn add(&self, phrase: &Phrase) -> Result<(), StoreError>;

    /// Persist a removal from the blocklist. Returns `false` if the phrase
    /// was not present.
    fn remove(&self, phrase: &Phrase) -> Result<bool, StoreError>;
}
