//! The Filter Gate (§4.7): a blocklist of phrases excluded from suggestions.
//!
//! Reads take the lock only long enough to clone an `Arc`, then check
//! membership against their own snapshot with no lock held — the hot
//! `suggest` path never blocks behind an admin `filter_add`/`filter_remove`
//! call, and never observes a half-updated set.

use crate::store::FilterSource;
use crate::{Phrase, StoreError};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Blocklist of phrases that must never be returned as suggestions.
pub struct FilterGate {
    snapshot: RwLock<Arc<HashSet<Phrase>>>,
    source: Arc<dyn FilterSource>,
}

impl FilterGate {
    /// Load the blocklist from `source` at startup.
    pub fn load(source: Arc<dyn FilterSource>) -> Result<Self, StoreError> {
        let initial = source.load_all()?;
        Ok(FilterGate {
            snapshot: RwLock::new(Arc::new(initial)),
            source,
        })
    }

    /// `true` if `phrase` is currently blocked.
    pub fn is_blocked(&self, phrase: &Phrase) -> bool {
        self.current().contains(phrase)
    }

    /// A cheap, point-in-time snapshot of the full blocklist.
    pub fn current(&self) -> Arc<HashSet<Phrase>> {
        self.snapshot.read().expect("filter gate lock poisoned").clone()
    }

    /// Add `phrase` to the blocklist (admin `filter_add`).
    pub fn block(&self, phrase: Phrase) -> Result<(), StoreError> {
        self.source.add(&phrase)?;
        let mut guard = self.snapshot.write().expect("filter gate lock poisoned");
        let mut next = HashSet::clone(&guard);
        next.insert(phrase);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Remove `phrase` from the blocklist (admin `filter_remove`). Returns
    /// `false` if it wasn't blocked.
    pub fn unblock(&self, phrase: &Phrase) -> Result<bool, StoreError> {
        let removed = self.source.remove(phrase)?;
        if removed {
            let mut guard = self.snapshot.write().expect("filter gate lock poisoned");
            let mut next = HashSet::clone(&guard);
            next.remove(phrase);
            *guard = Arc::new(next);
        }
        Ok(removed)
    }

    /// Number of currently blocked phrases.
    pub fn len(&self) -> usize {
        self.current().len()
    }
}
