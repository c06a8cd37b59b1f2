//! Bounded, append-only history with oldest-first eviction.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A fixed-capacity ring that can be read while another thread appends.
///
/// Readers get an owned snapshot, newest entry first.
#[derive(Debug)]
pub struct RingBuffer<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn push(&self, entry: T) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Every entry, newest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().iter().rev().cloned().collect()
    }

    /// Up to `limit` entries matching `filter`, newest first.
    pub fn filtered(&self, filter: impl Fn(&T) -> bool, limit: usize) -> Vec<T> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| filter(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
