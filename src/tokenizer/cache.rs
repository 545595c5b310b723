//! Bounded memoization of `encode` results.
//!
//! Entries are tagged implicitly with the cache epoch. Reloading the merge
//! table bumps the epoch and drops every entry, and an insert computed under an
//! older epoch is discarded.

use std::collections::{BTreeMap, HashMap};

use super::bpe::TokenId;

#[derive(Debug)]
struct CacheEntry {
    ids: Vec<TokenId>,
    last_used: u64,
}

/// Least-recently-used text -> ids map with a fixed capacity.
///
/// `recency` mirrors `entries` keyed by `last_used`; clock values are unique,
/// so its first key is always the stalest entry.
#[derive(Debug)]
pub(crate) struct EncodeCache {
    entries: HashMap<String, CacheEntry>,
    recency: BTreeMap<u64, String>,
    capacity: usize,
    epoch: u64,
    clock: u64,
}

impl EncodeCache {
    /// Creates a cache holding at most `capacity` entries. Zero disables caching.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            capacity,
            epoch: 0,
            clock: 0,
        }
    }

    pub(crate) fn get(&mut self, text: &str) -> Option<Vec<TokenId>> {
        let entry = self.entries.get_mut(text)?;
        self.clock += 1;
        if let Some(key) = self.recency.remove(&entry.last_used) {
            self.recency.insert(self.clock, key);
        }
        entry.last_used = self.clock;
        Some(entry.ids.clone())
    }

    /// Stores `ids` for `text` if they were computed under the current epoch.
    pub(crate) fn insert(&mut self, text: &str, ids: Vec<TokenId>, epoch: u64) -> bool {
        if self.capacity == 0 || epoch != self.epoch {
            return false;
        }
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(text) {
            self.recency.remove(&entry.last_used);
            entry.ids = ids;
            entry.last_used = self.clock;
        } else {
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
            self.entries.insert(
                text.to_owned(),
                CacheEntry {
                    ids,
                    last_used: self.clock,
                },
            );
        }
        self.recency.insert(self.clock, text.to_owned());
        true
    }

    /// Drops every entry and starts a new epoch.
    pub(crate) fn invalidate(&mut self) -> u64 {
        self.entries.clear();
        self.recency.clear();
        self.epoch += 1;
        self.epoch
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn evict_lru(&mut self) {
        if let Some((_, text)) = self.recency.pop_first() {
            self.entries.remove(&text);
        }
    }
}
