//! Bounded cache for out-of-order persistent modifiers.
//!
//! Blocks whose dependencies are not in history yet wait here until the view
//! holder pulls them out. Eviction is deterministic: oldest insertion first,
//! tracked by a monotone sequence number. Applicability scans run in
//! ascending id byte order, so which modifier is picked is reproducible.

use arden_types::{Block, ModifierId};
use arden_view::HistoryReader;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry {
    block: Block,
    seq: u64,
}

/// Capacity-bounded map of modifier id to cached block.
#[derive(Debug)]
pub struct ModifiersCache {
    capacity: usize,
    entries: BTreeMap<ModifierId, CacheEntry>,
    next_seq: u64,
}

impl ModifiersCache {
    /// Create a cache holding at most `capacity` blocks after cleanup.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the id is cached.
    pub fn contains(&self, id: &ModifierId) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert a block. A re-insert of a cached id keeps the original entry
    /// and its insertion age.
    pub fn put(&mut self, id: ModifierId, block: Block) {
        let seq = self.next_seq;
        self.entries.entry(id).or_insert_with(|| {
            trace!(id = %id, seq, "caching modifier");
            CacheEntry { block, seq }
        });
        self.next_seq += 1;
    }

    /// Fetch a cached block.
    pub fn get(&self, id: &ModifierId) -> Option<&Block> {
        self.entries.get(id).map(|e| &e.block)
    }

    /// Remove a cached block.
    pub fn remove(&mut self, id: &ModifierId) -> Option<Block> {
        self.entries.remove(id).map(|e| e.block)
    }

    /// Remove and return one cached block that history would accept now.
    ///
    /// Candidates are tried in ascending id order; the first applicable one
    /// wins.
    pub fn find_applicable(&mut self, history: &dyn HistoryReader) -> Option<Block> {
        let id = self
            .entries
            .iter()
            .find(|(_, entry)| history.applicable_try(&entry.block).is_ok())
            .map(|(id, _)| *id)?;
        self.remove(&id)
    }

    /// Evict oldest-inserted blocks until the cache fits its capacity.
    ///
    /// Returns the evicted blocks so their ids can be demoted to unknown.
    pub fn clean_overfull(&mut self) -> Vec<(ModifierId, Block)> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    if let Some(entry) = self.entries.remove(&id) {
                        evicted.push((id, entry.block));
                    }
                }
                None => break,
            }
        }
        evicted
    }
}
