//! The Prefix Index (§4.1): an arena-allocated trie keyed on normalized
//! phrases, with a top-K cache of highest-count descendants maintained at
//! every node.
//!
//! Reads (`lookup`) take a shared lock and never block on each other.
//! Incremental writes (`apply_delta`, `remove_phrase`) repair the top-K
//! cache bottom-up from the changed node to the root, stopping as soon as a
//! repair is a no-op. A full `rebuild` constructs an entirely new arena
//! off-lock and swaps it in under a single brief write lock, so lookups are
//! blocked only for the instant of the swap rather than for the whole
//! rebuild.

mod node;

pub use node::CacheEntry;
use node::{merge_cache, Node, TerminalData, NIL};

use crate::error::IndexError;
use crate::store::PhraseCount;
use crate::Phrase;
use std::sync::RwLock;

struct Arena {
    nodes: Vec<Option<Node>>,
    free: Vec<u32>,
    root: u32,
    phrase_count: u64,
}

impl Arena {
    fn new() -> Self {
        Arena {
            nodes: vec![Some(Node::branch(NIL))],
            free: Vec::new(),
            root: 0,
            phrase_count: 0,
        }
    }

    fn alloc(&mut self, node: Node) -> u32 {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx as usize] = Some(node);
            idx
        } else {
            let idx = self.nodes.len() as u32;
            self.nodes.push(Some(node));
            idx
        }
    }

    fn free_node(&mut self, idx: u32) {
        self.nodes[idx as usize] = None;
        self.free.push(idx);
    }

    fn get(&self, idx: u32) -> &Node {
        self.nodes[idx as usize]
            .as_ref()
            .expect("prefix index: dangling node index")
    }

    fn get_mut(&mut self, idx: u32) -> &mut Node {
        self.nodes[idx as usize]
            .as_mut()
            .expect("prefix index: dangling node index")
    }

    fn find(&self, prefix: &str) -> Option<u32> {
        let mut cur = self.root;
        for ch in prefix.chars() {
            cur = *self.get(cur).children.get(&ch)?;
        }
        Some(cur)
    }

    fn find_or_create(&mut self, phrase: &str) -> u32 {
        let mut cur = self.root;
        for ch in phrase.chars() {
            let next = self.get(cur).children.get(&ch).copied();
            let next = match next {
                Some(n) => n,
                None => {
                    let idx = self.alloc(Node::branch(cur));
                    self.get_mut(cur).children.insert(ch, idx);
                    idx
                }
            };
            cur = next;
        }
        cur
    }

    fn repair_cache(&mut self, idx: u32, cache_k: usize) -> bool {
        let children_caches: Vec<Vec<CacheEntry>> = self
            .get(idx)
            .children
            .values()
            .map(|&c| self.get(c).cache.clone())
            .collect();
        let own = self.get(idx).terminal.clone();
        let new_cache = merge_cache(own.as_ref(), children_caches.iter().map(Vec::as_slice), cache_k);
        let changed = self.get(idx).cache != new_cache;
        if changed {
            self.get_mut(idx).cache = new_cache;
        }
        changed
    }

    /// Repair caches from `idx` up to the root, stopping at the first
    /// ancestor whose cache doesn't change.
    fn repair_path_to_root(&mut self, idx: u32, cache_k: usize) {
        let mut cur = idx;
        loop {
            let changed = self.repair_cache(cur, cache_k);
            let parent = self.get(cur).parent;
            if !changed || parent == NIL {
                break;
            }
            cur = parent;
        }
    }

    fn apply_delta_incremental(&mut self, phrase: &Phrase, delta: i64, cache_k: usize) {
        let idx = self.find_or_create(phrase.as_str());
        let existing = self.get(idx).terminal.clone();
        let new_count = existing
            .as_ref()
            .map(|t| t.count)
            .unwrap_or(0)
            .saturating_add_signed(delta);
        if existing.is_none() {
            self.phrase_count += 1;
        }
        self.get_mut(idx).terminal = Some(TerminalData {
            phrase: phrase.clone(),
            count: new_count,
        });
        self.repair_path_to_root(idx, cache_k);
    }

    fn insert_bulk(&mut self, phrase: Phrase, count: u64) {
        let idx = self.find_or_create(phrase.as_str());
        if self.get(idx).terminal.is_none() {
            self.phrase_count += 1;
        }
        self.get_mut(idx).terminal = Some(TerminalData { phrase, count });
    }

    fn rebuild_caches_from(&mut self, idx: u32, cache_k: usize) {
        let children: Vec<u32> = self.get(idx).children.values().copied().collect();
        for child in children {
            self.rebuild_caches_from(child, cache_k);
        }
        self.repair_cache(idx, cache_k);
    }

    fn remove_phrase(&mut self, phrase: &str, cache_k: usize) -> bool {
        let Some(idx) = self.find(phrase) else {
            return false;
        };
        if self.get(idx).terminal.is_none() {
            return false;
        }
        self.get_mut(idx).terminal = None;
        self.phrase_count -= 1;

        let mut cur = idx;
        while cur != self.root && self.get(cur).is_empty_branch() {
            let parent = self.get(cur).parent;
            let stale_edge = self
                .get(parent)
                .children
                .iter()
                .find(|(_, &child)| child == cur)
                .map(|(&ch, _)| ch);
            if let Some(ch) = stale_edge {
                self.get_mut(parent).children.remove(&ch);
            }
            self.free_node(cur);
            cur = parent;
        }
        self.repair_path_to_root(cur, cache_k);
        true
    }
}

/// Arena-allocated prefix trie over normalized phrases, with per-node top-K
/// caches (§4.1).
pub struct PrefixIndex {
    arena: RwLock<Arena>,
    cache_k: usize,
}

impl PrefixIndex {
    /// `cache_k` bounds the size of every node's cache; lookups can request
    /// at most this many results.
    pub fn new(cache_k: usize) -> Self {
        PrefixIndex {
            arena: RwLock::new(Arena::new()),
            cache_k,
        }
    }

    /// Apply a non-negative count delta, creating the phrase's path if
    /// necessary. This is the only write path available outside `rebuild`
    /// (§8 I1): negative deltas here would desynchronize the durable count
    /// from the index, so they're rejected rather than silently applied.
    pub fn apply_delta(&self, phrase: &Phrase, delta: i64) -> Result<(), IndexError> {
        if phrase.is_empty() {
            return Err(IndexError::InvalidPhrase(phrase.clone()));
        }
        if delta < 0 {
            return Err(IndexError::InvariantViolation {
                phrase: phrase.clone(),
                delta,
            });
        }
        if delta == 0 {
            return Ok(());
        }
        let mut arena = self.arena.write().expect("prefix index lock poisoned");
        arena.apply_delta_incremental(phrase, delta, self.cache_k);
        Ok(())
    }

    /// Remove a phrase from the index entirely (admin `delete_phrase`).
    /// Returns `false` if the phrase wasn't indexed.
    pub fn remove_phrase(&self, phrase: &Phrase) -> bool {
        let mut arena = self.arena.write().expect("prefix index lock poisoned");
        arena.remove_phrase(phrase.as_str(), self.cache_k)
    }

    /// Set a phrase's count to an absolute value, creating its path if
    /// necessary (admin `upsert_phrase`). Unlike [`Self::apply_delta`] this
    /// accepts a count lower than the current one: it's an administrative
    /// correction, not an incremental write, so the negative-delta
    /// invariant doesn't apply.
    pub fn set_count(&self, phrase: &Phrase, count: u64) -> Result<(), IndexError> {
        if phrase.is_empty() {
            return Err(IndexError::InvalidPhrase(phrase.clone()));
        }
        let mut arena = self.arena.write().expect("prefix index lock poisoned");
        let idx = arena.find_or_create(phrase.as_str());
        if arena.get(idx).terminal.is_none() {
            arena.phrase_count += 1;
        }
        arena.get_mut(idx).terminal = Some(TerminalData {
            phrase: phrase.clone(),
            count,
        });
        arena.repair_path_to_root(idx, self.cache_k);
        Ok(())
    }

    /// Replace the entire index from a fresh durable count snapshot (§4.1
    /// `rebuild`). The new arena is built off-lock; only the final swap
    /// holds the write lock.
    pub fn rebuild(&self, counts: impl IntoIterator<Item = PhraseCount>) -> Result<(), IndexError> {
        let mut fresh = Arena::new();
        for pc in counts {
            if pc.phrase.is_empty() {
                return Err(IndexError::InvalidPhrase(pc.phrase));
            }
            fresh.insert_bulk(pc.phrase, pc.count);
        }
        fresh.rebuild_caches_from(fresh.root, self.cache_k);

        let mut arena = self.arena.write().expect("prefix index lock poisoned");
        *arena = fresh;
        Ok(())
    }

    /// Top-K phrases under `prefix`, highest count first. Returns an empty
    /// vector for a prefix with no indexed completions; the empty prefix
    /// returns the global top-K.
    pub fn lookup(&self, prefix: &Phrase, k: usize) -> Vec<CacheEntry> {
        let arena = self.arena.read().expect("prefix index lock poisoned");
        let Some(idx) = arena.find(prefix.as_str()) else {
            return Vec::new();
        };
        let mut results = arena.get(idx).cache.clone();
        results.truncate(k.min(self.cache_k));
        results
    }

    /// Durable count for an exact phrase, if indexed.
    pub fn count_of(&self, phrase: &Phrase) -> Option<u64> {
        let arena = self.arena.read().expect("prefix index lock poisoned");
        let idx = arena.find(phrase.as_str())?;
        arena.get(idx).terminal.as_ref().map(|t| t.count)
    }

    /// Number of distinct indexed phrases.
    pub fn size(&self) -> u64 {
        self.arena.read().expect("prefix index lock poisoned").phrase_count
    }

    /// Number of live arena slots (diagnostic; exposed via admin `status`).
    pub fn node_count(&self) -> usize {
        let arena = self.arena.read().expect("prefix index lock poisoned");
        arena.nodes.len() - arena.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Phrase {
        Phrase::normalize_lookup(s)
    }

    #[test]
    fn lookup_returns_highest_count_first() {
        let idx = PrefixIndex::new(10);
        idx.apply_delta(&p("new york"), 5).unwrap();
        idx.apply_delta(&p("new york city"), 20).unwrap();
        idx.apply_delta(&p("new orleans"), 1).unwrap();

        let results = idx.lookup(&p("new"), 10);
        assert_eq!(results[0].phrase, p("new york city"));
        assert_eq!(results[1].phrase, p("new york"));
        assert_eq!(results[2].phrase, p("new orleans"));
    }

    #[test]
    fn deterministic_tiebreak_by_phrase() {
        let idx = PrefixIndex::new(10);
        idx.apply_delta(&p("cat"), 5).unwrap();
        idx.apply_delta(&p("car"), 5).unwrap();
        let results = idx.lookup(&p("ca"), 10);
        assert_eq!(results[0].phrase, p("car"));
        assert_eq!(results[1].phrase, p("cat"));
    }

    #[test]
    fn negative_delta_outside_rebuild_is_rejected() {
        let idx = PrefixIndex::new(10);
        idx.apply_delta(&p("cat"), 5).unwrap();
        let err = idx.apply_delta(&p("cat"), -1).unwrap_err();
        assert!(matches!(err, IndexError::InvariantViolation { .. }));
    }

    #[test]
    fn rebuild_replaces_index_contents() {
        let idx = PrefixIndex::new(10);
        idx.apply_delta(&p("stale"), 99).unwrap();
        idx.rebuild(vec![PhraseCount { phrase: p("fresh"), count: 3 }]).unwrap();
        assert!(idx.lookup(&p("stale"), 10).is_empty());
        assert_eq!(idx.lookup(&p("fresh"), 10)[0].count, 3);
    }

    #[test]
    fn remove_prunes_empty_branch_chain() {
        let idx = PrefixIndex::new(10);
        idx.apply_delta(&p("solitary"), 1).unwrap();
        let nodes_before = idx.node_count();
        assert!(idx.remove_phrase(&p("solitary")));
        assert!(idx.lookup(&p("solitary"), 10).is_empty());
        assert!(idx.node_count() < nodes_before);
    }

    #[test]
    fn remove_keeps_shared_prefix_siblings() {
        let idx = PrefixIndex::new(10);
        idx.apply_delta(&p("cat"), 1).unwrap();
        idx.apply_delta(&p("cats"), 1).unwrap();
        assert!(idx.remove_phrase(&p("cats")));
        assert_eq!(idx.lookup(&p("cat"), 10).len(), 1);
    }

    #[test]
    fn empty_prefix_returns_global_top_k() {
        let idx = PrefixIndex::new(10);
        idx.apply_delta(&p("alpha"), 1).unwrap();
        idx.apply_delta(&p("beta"), 2).unwrap();
        let results = idx.lookup(&p(""), 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].phrase, p("beta"));
    }

    #[test]
    fn unknown_prefix_returns_empty() {
        let idx = PrefixIndex::new(10);
        idx.apply_delta(&p("alpha"), 1).unwrap();
        assert!(idx.lookup(&p("zzz"), 10).is_empty());
    }
}
