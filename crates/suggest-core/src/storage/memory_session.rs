//! In-memory [`SessionStore`] (§6 reference implementation), keyed by
//! `user_id`. This history is inherently short-lived and per-process, so
//! unlike the log store it has no durability requirement and no SQLite
//! backing.

use crate::store::{HistoryEntry, SessionStore, StoreError};
use crate::Phrase;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Per-user ring buffer of recent completions, capped at `H` entries per
/// user.
pub struct InMemorySessionStore {
    max_entries: usize,
    users: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
}

impl InMemorySessionStore {
    pub fn new(max_entries: usize) -> Self {
        InMemorySessionStore {
            max_entries,
            users: Mutex::new(HashMap::new()),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn record(&self, user_id: &str, phrase: Phrase, occurred_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut users = self.users.lock().expect("session store lock poisoned");
        let entries = users.entry(user_id.to_string()).or_default();
        // §3 UserHistory: a repeated phrase moves to the head rather than
        // inserting a second entry.
        entries.retain(|e| e.phrase != phrase);
        entries.push_front(HistoryEntry { phrase, occurred_at });
        while entries.len() > self.max_entries {
            entries.pop_back();
        }
        Ok(())
    }

    fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let users = self.users.lock().expect("session store lock poisoned");
        Ok(users
            .get(user_id)
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut users = self.users.lock().expect("session store lock poisoned");
        let mut removed = 0u64;
        users.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.occurred_at >= cutoff);
            removed += (before - entries.len()) as u64;
            !entries.is_empty()
        });
        Ok(removed)
    }
}
