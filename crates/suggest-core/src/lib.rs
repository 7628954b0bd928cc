//! Prefix index, ranking composition, and write-path aggregation for a
//! search-box autocomplete engine.
//!
//! [`engine::SuggestionEngine`] is the composition root: it owns the
//! [`trie::PrefixIndex`] (C1), [`ranking`] Composer (C2), [`service::SuggestionService`]
//! (C3), [`trending::TrendingTracker`] (C4), [`history::HistoryTracker`] (C5),
//! [`aggregator::Aggregator`] (C6), and [`filter::FilterGate`] (C7), and exposes
//! the read path, write path, and admin operations as inherent methods.
//!
//! Storage is behind the [`store::LogStore`], [`store::SessionStore`], and
//! [`store::FilterSource`] traits; [`storage`] holds this crate's reference
//! implementations.

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod history;
mod normalize;
pub mod ranking;
pub mod service;
pub mod storage;
pub mod store;
pub mod trending;
pub mod trie;

pub use error::{EngineError, IndexError};
pub use normalize::{NormalizeError, Phrase, MAX_PHRASE_CHARS, MAX_RAW_BYTES};
pub use store::StoreError;

/// Common imports for embedding this crate: the composition root, its
/// config, the request/result types, and the error it returns.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::engine::{EngineStatus, SuggestionEngine};
    pub use crate::error::EngineError;
    pub use crate::ranking::{Source, SuggestionResult};
    pub use crate::service::SuggestRequest;
    pub use crate::Phrase;
}
