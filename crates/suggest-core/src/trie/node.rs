//! Arena node representation for the Prefix Index.
//!
//! Grounded on the arena-allocated trie in `collections::Trie` (see
//! DESIGN.md): nodes live in a flat `Vec`, children are addressed by index
//! rather than by pointer, and a free-list recycles slots left behind by
//! `remove`.

use crate::Phrase;
use std::collections::BTreeMap;

/// Sentinel for "no such node" in an index slot (parent of root, empty child).
pub const NIL: u32 = u32::MAX;

/// One phrase's durable count, as cached at an ancestor node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub phrase: Phrase,
    pub count: u64,
}

impl CacheEntry {
    /// Ordering key: higher count first, then lexicographic phrase as a
    /// deterministic tiebreak (§8 I2: lookups are a pure function of index
    /// state, so ties must not depend on iteration order).
    fn sort_key(&self) -> (std::cmp::Reverse<u64>, &str) {
        (std::cmp::Reverse(self.count), self.phrase.as_str())
    }
}

#[derive(Debug)]
pub(super) struct Node {
    pub parent: u32,
    pub children: BTreeMap<char, u32>,
    /// Set once this node terminates a phrase (the full string from root to
    /// here, inclusive, is indexable). `None` for pure branch nodes.
    pub terminal: Option<TerminalData>,
    /// Top-K cache of phrases in this node's subtree (including itself if
    /// terminal), sorted by [`CacheEntry::sort_key`].
    pub cache: Vec<CacheEntry>,
}

#[derive(Debug, Clone)]
pub(super) struct TerminalData {
    pub phrase: Phrase,
    pub count: u64,
}

impl Node {
    pub(super) fn branch(parent: u32) -> Self {
        Node {
            parent,
            children: BTreeMap::new(),
            terminal: None,
            cache: Vec::new(),
        }
    }

    pub(super) fn is_empty_branch(&self) -> bool {
        self.terminal.is_none() && self.children.is_empty()
    }
}

/// Merge this node's own terminal entry (if any) with its children's caches,
/// keeping the `cache_k` highest by [`CacheEntry::sort_key`].
///
/// Children's caches are already sorted and already capped at `cache_k`, so
/// a node never needs more than `cache_k * (children + 1)` candidates.
pub(super) fn merge_cache<'a>(
    own: Option<&TerminalData>,
    children: impl Iterator<Item = &'a [CacheEntry]>,
    cache_k: usize,
) -> Vec<CacheEntry> {
    let mut candidates: Vec<CacheEntry> = Vec::new();
    if let Some(t) = own {
        candidates.push(CacheEntry {
            phrase: t.phrase.clone(),
            count: t.count,
        });
    }
    for child_cache in children {
        candidates.extend(child_cache.iter().cloned());
    }
    candidates.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    candidates.truncate(cache_k);
    candidates
}
