//! Bounded dedup cache
//!
//! Remembers the most recent `capacity` distinct identities. Eviction is
//! strictly by insertion order; lookups never refresh an entry.
//!
//! Not synchronized. The inbound buffer keeps it under its queue lock so
//! test-and-add is atomic with the dequeue; the outbound fetch loop owns
//! its cache outright.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Identities seen recently, FIFO-evicted
#[derive(Debug)]
pub struct DedupCache<K> {
    capacity: usize,
    order: VecDeque<K>,
    seen: HashSet<K>,
}

/// Upper bound on the up-front allocation; larger caches grow on demand
const MAX_PREALLOC: usize = 4096;

impl<K: Hash + Eq + Clone> DedupCache<K> {
    /// Create a cache holding at most `capacity` keys (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let prealloc = capacity.min(MAX_PREALLOC);
        Self {
            capacity,
            order: VecDeque::with_capacity(prealloc),
            seen: HashSet::with_capacity(prealloc),
        }
    }

    /// Insert `key` if absent
    ///
    /// Returns true if the key was new (the item should be forwarded),
    /// false if it is a duplicate.
    pub fn test_and_add(&mut self, key: K) -> bool {
        if self.seen.contains(&key) {
            return false;
        }

        if self.order.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }

        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
