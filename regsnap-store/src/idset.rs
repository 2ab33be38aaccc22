//! Set of entry ids associated with one index key. Optimized for the
//! common case of 1-3 ids per key while admitting thousands.

use regsnap_core::ContentId;
use smallvec::SmallVec;

/// Small-set optimized id set with idempotent insert and remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    ids: SmallVec<[ContentId; 2]>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an id. Returns false if it was already present.
    pub fn insert(&mut self, id: ContentId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Remove an id. Returns false if it was not present.
    pub fn remove(&mut self, id: ContentId) -> bool {
        match self.ids.iter().position(|&existing| existing == id) {
            Some(pos) => {
                self.ids.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ContentId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ContentId> + '_ {
        self.ids.iter().copied()
    }

    /// Snapshot of the ids, sorted for deterministic consumption.
    pub fn to_sorted_vec(&self) -> Vec<ContentId> {
        let mut ids: Vec<ContentId> = self.ids.to_vec();
        ids.sort_unstable();
        ids
    }
}
