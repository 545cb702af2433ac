//! Ordered prefix index facade.
//!
//! A thin semantic wrapper over an ordered byte-string map. Multi-key
//! traversal is exposed as a snapshot of matching keys: the match set is
//! collected before any per-entry work runs, so a traversal never observes
//! entries written by its own callback.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::item::Item;

/// Prefix-ordered storage for the engine.
#[derive(Debug, Default)]
pub struct PrefixIndex {
    map: BTreeMap<Vec<u8>, Item>,
}

impl PrefixIndex {
    pub fn new() -> Self {
        PrefixIndex {
            map: BTreeMap::new(),
        }
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Point lookup.
    pub fn get(&self, key: &[u8]) -> Option<&Item> {
        self.map.get(key)
    }

    /// Point lookup with in-place mutation access.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Item> {
        self.map.get_mut(key)
    }

    /// Inserts, returning the displaced item when the key was present.
    pub fn insert(&mut self, key: Vec<u8>, item: Item) -> Option<Item> {
        self.map.insert(key, item)
    }

    /// Removes, returning the detached item when the key was present.
    pub fn remove(&mut self, key: &[u8]) -> Option<Item> {
        self.map.remove(key)
    }

    /// Snapshot of all keys starting with `expr`, in order, bounded by
    /// `limit` (`None` = unbounded) and `max_key_len`.
    pub fn matching_keys(
        &self,
        expr: &[u8],
        limit: Option<usize>,
        max_key_len: usize,
    ) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let range = self
            .map
            .range::<[u8], _>((Bound::Included(expr), Bound::Unbounded));
        for (key, _) in range {
            if !key.starts_with(expr) {
                break;
            }
            if key.len() > max_key_len {
                continue;
            }
            out.push(key.clone());
            if limit.is_some_and(|cap| out.len() >= cap) {
                break;
            }
        }
        out
    }
}
