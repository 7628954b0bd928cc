//! Error taxonomy for the suggestion engine.
//!
//! Kinds, not types: every public operation fails with one of these variants,
//! mirroring the taxonomy in the specification rather than leaking storage- or
//! transport-specific error types across the crate boundary.

use crate::Phrase;

/// Top-level error returned by engine-facing operations (`suggest`,
/// `log_completion`, admin operations).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Prefix was empty after normalization, or exceeded the maximum length.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Ingested query failed normalization (empty, over-long, or otherwise malformed).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Lookup exceeded its deadline before the Composer could finish.
    #[error("lookup deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded {
        /// Time actually spent before the deadline fired.
        elapsed_ms: u64,
    },

    /// The Prefix Index is unavailable; reads cannot be served at all.
    #[error("service degraded: {0}")]
    ServiceDegraded(String),

    /// Programmer error: an internal invariant was violated. Never user-visible.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Admin operation referenced a phrase that doesn't exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `history` was called without a user id, or with one that normalizes
    /// to empty.
    #[error("missing user id")]
    MissingUser,

    /// Underlying Log Store failed in a way the caller must see (not the
    /// retried/backed-off path inside the Aggregator).
    #[error("log store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

/// Error returned by [`crate::trie::PrefixIndex`] operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IndexError {
    /// Phrase was empty or exceeded the maximum indexable length.
    #[error("invalid phrase: {0:?}")]
    InvalidPhrase(Phrase),

    /// A negative count delta was applied outside of a rebuild.
    #[error("invariant violation: negative count delta {delta} for {phrase:?} outside rebuild")]
    InvariantViolation {
        /// The phrase the delta was applied to.
        phrase: Phrase,
        /// The offending (negative) delta.
        delta: i64,
    },
}

impl From<IndexError> for EngineError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidPhrase(p) => EngineError::InvalidQuery(format!("{p:?}")),
            IndexError::InvariantViolation { phrase, delta } => EngineError::InvariantViolation(
                format!("negative delta {delta} for {phrase:?} outside rebuild"),
            ),
        }
    }
}
