//! Bounded FIFO buffer
//!
//! Backs the "recent activity" event buffer and the per-tick trend series.
//! Pushing into a full buffer evicts the single oldest entry.

use std::collections::VecDeque;

/// Read order for [`RingBuffer::recent_n`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Arrival order
    #[default]
    OldestFirst,
    /// Reverse arrival order
    NewestFirst,
}

/// Entries allocated up front; larger buffers grow on demand
const PREALLOCATE_LIMIT: usize = 1024;

/// Fixed-capacity, insertion-ordered buffer
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
            capacity,
        }
    }

    /// Append an entry, returning the evicted oldest entry if the buffer was full
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(value);
        evicted
    }

    /// Number of entries currently stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting the oldest entries if shrinking
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Most recently pushed entry
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// The last `min(k, len)` entries in the requested order
    pub fn recent_n(&self, k: usize, order: Order) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(k);
        let tail = self.entries.iter().skip(skip).cloned();
        match order {
            Order::OldestFirst => tail.collect(),
            Order::NewestFirst => {
                let mut items: Vec<T> = tail.collect();
                items.reverse();
                items
            }
        }
    }

    /// Copy all entries, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}
