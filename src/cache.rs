//! Block timestamp cache
//!
//! In-memory cache to avoid repeated RPC calls for the timestamp of a block
//! that carries several reward transfers. Lives for a single run; block
//! timestamps never change once a block is final, so entries are never evicted.

use std::collections::HashMap;

/// Maps block number -> block timestamp (Unix epoch seconds).
#[derive(Debug)]
pub struct TimestampCache {
    cache: HashMap<u64, u64>,
}

impl TimestampCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Returns `None` if the block has not been seen yet.
    pub fn get(&self, block: u64) -> Option<u64> {
        self.cache.get(&block).copied()
    }

    pub fn insert(&mut self, block: u64, timestamp: u64) {
        self.cache.insert(block, timestamp);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for TimestampCache {
    fn default() -> Self {
        Self::new()
    }
}
