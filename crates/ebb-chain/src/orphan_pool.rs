//! Holding area for blocks whose parent has not arrived yet.
//!
//! Orphans are indexed by parent hash so that when a parent finally
//! connects, every waiting child can be pulled out in one call. The pool is
//! bounded; at capacity the oldest arrival is dropped. The arrival queue may
//! hold hashes of blocks already claimed by [`take_children`]; eviction
//! skips those lazily instead of rewriting the queue on every claim.
//!
//! [`take_children`]: OrphanPool::take_children

use std::collections::{HashMap, VecDeque};

use ebb_core::types::{Block, Hash256};
use tracing::warn;

pub struct OrphanPool {
    blocks: HashMap<Hash256, Block>,
    by_parent: HashMap<Hash256, Vec<Hash256>>,
    arrival: VecDeque<Hash256>,
    capacity: usize,
}

impl OrphanPool {
    /// Pool holding at most `capacity` blocks. Zero disables retention.
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            by_parent: HashMap::new(),
            arrival: VecDeque::new(),
            capacity,
        }
    }

    /// Store an orphan. Returns false if it is already pooled or retention
    /// is disabled.
    pub fn insert(&mut self, block: Block) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let hash = block.header.hash();
        if self.blocks.contains_key(&hash) {
            return false;
        }
        while self.blocks.len() >= self.capacity {
            let Some(oldest) = self.arrival.pop_front() else {
                break;
            };
            // Stale queue entries (already claimed) resolve to None here.
            if let Some(evicted) = self.remove(&oldest) {
                warn!(
                    hash = %oldest,
                    parent = %evicted.header.prev_hash,
                    "orphan pool full, dropping oldest"
                );
            }
        }
        self.by_parent
            .entry(block.header.prev_hash)
            .or_default()
            .push(hash);
        self.blocks.insert(hash, block);
        self.arrival.push_back(hash);
        true
    }

    fn remove(&mut self, hash: &Hash256) -> Option<Block> {
        let block = self.blocks.remove(hash)?;
        let parent = block.header.prev_hash;
        if let Some(siblings) = self.by_parent.get_mut(&parent) {
            siblings.retain(|h| h != hash);
            if siblings.is_empty() {
                self.by_parent.remove(&parent);
            }
        }
        Some(block)
    }

    /// Whether a block with this hash is pooled.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Remove and return every orphan waiting on `parent`.
    pub fn take_children(&mut self, parent: &Hash256) -> Vec<Block> {
        let hashes = self.by_parent.remove(parent).unwrap_or_default();
        hashes
            .iter()
            .filter_map(|h| self.blocks.remove(h))
            .collect()
    }

    /// Number of pooled blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
