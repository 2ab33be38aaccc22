//! Inverted index: normalized resource value -> set of entry ids.
//!
//! Keys with empty id sets are pruned eagerly so that every stored set is
//! non-empty at all times.

use std::hash::Hash;

use fnv::FnvHashMap;
use regsnap_core::ContentId;

use crate::idset::IdSet;

#[derive(Debug, Clone, Default)]
pub struct ResourceIndex<K> {
    map: FnvHashMap<K, IdSet>,
}

impl<K: Eq + Hash> ResourceIndex<K> {
    pub fn new() -> Self {
        Self {
            map: FnvHashMap::default(),
        }
    }

    /// Associate `id` with `key`. Idempotent.
    pub fn insert(&mut self, key: K, id: ContentId) {
        self.map.entry(key).or_default().insert(id);
    }

    /// Drop the association of `id` with `key`, pruning the key when its
    /// set empties. Idempotent.
    pub fn remove(&mut self, key: &K, id: ContentId) {
        if let Some(set) = self.map.get_mut(key) {
            set.remove(id);
            if set.is_empty() {
                self.map.remove(key);
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&IdSet> {
        self.map.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Cardinality of the largest id set.
    pub fn max_set_len(&self) -> usize {
        self.map.values().map(IdSet::len).max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &IdSet)> {
        self.map.iter()
    }
}
