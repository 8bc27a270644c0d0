//! Bounded associative ring for correlating hardware timestamps with the
//! messages they belong to.

use std::collections::VecDeque;

/// Fixed-capacity store of `(key, value)` pairs. When full, inserting
/// evicts the oldest unmatched entry.
#[derive(Debug, Clone)]
pub struct TimestampRing<K, V> {
    entries: VecDeque<(K, V)>,
    capacity: usize,
}

impl<K: PartialEq, V> TimestampRing<K, V> {
    /// Create a ring holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Store a value. Returns the evicted oldest entry, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back((key, value));
        evicted
    }

    /// Remove and return the value stored under `key`.
    pub fn find_and_remove(&mut self, key: &K) -> Option<V> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        self.entries.remove(index).map(|(_, v)| v)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
