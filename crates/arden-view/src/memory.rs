//! In-memory history and mempool.
//!
//! These back the reader traits for the node-view side of the synchronizer
//! and for tests. A single linear chain is tracked; fork choice is not this
//! crate's concern.

use crate::{ApplicabilityError, ChainComparison, HistoryReader, MempoolReader};
use arden_types::{Block, ModifierId, ModifierType, SyncInfo, Transaction};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Number of recent ids included in a chain summary.
const SYNC_SUMMARY_IDS: usize = 10;

#[derive(Debug, Default)]
struct HistoryInner {
    /// Applied block ids, oldest first.
    chain: Vec<ModifierId>,
    /// Applied blocks by id.
    blocks: HashMap<ModifierId, Block>,
}

/// In-memory chain history.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    inner: RwLock<HistoryInner>,
}

impl MemoryHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a block to the chain tip.
    pub fn apply(&self, block: Block) -> Result<ModifierId, ApplicabilityError> {
        self.applicable_try(&block)?;
        let id = block.id();
        let mut inner = self.inner.write();
        inner.chain.push(id);
        inner.blocks.insert(id, block);
        debug!(id = %id, height = inner.chain.len(), "block applied");
        Ok(id)
    }

    /// Current chain height.
    pub fn height(&self) -> u32 {
        self.inner.read().chain.len() as u32
    }

    /// Id of the chain tip, if any.
    pub fn best_id(&self) -> Option<ModifierId> {
        self.inner.read().chain.last().copied()
    }
}

impl HistoryReader for MemoryHistory {
    fn compare(&self, other: &SyncInfo) -> ChainComparison {
        let inner = self.inner.read();

        let our_tip = match inner.chain.last() {
            Some(tip) => *tip,
            None => {
                return if other.is_empty() {
                    ChainComparison::Equal
                } else {
                    ChainComparison::Older
                }
            }
        };

        let their_tip = match other.best_id() {
            Some(tip) => tip,
            None => return ChainComparison::Younger,
        };

        if their_tip == our_tip {
            ChainComparison::Equal
        } else if inner.blocks.contains_key(&their_tip) {
            ChainComparison::Younger
        } else if other
            .last_block_ids()
            .iter()
            .any(|id| inner.blocks.contains_key(id))
        {
            ChainComparison::Older
        } else {
            ChainComparison::Nonsense
        }
    }

    fn continuation_ids(
        &self,
        other: &SyncInfo,
        limit: usize,
    ) -> Option<Vec<(ModifierType, ModifierId)>> {
        let inner = self.inner.read();

        if other.is_empty() {
            return Some(
                inner
                    .chain
                    .iter()
                    .take(limit)
                    .map(|id| (ModifierType::Block, *id))
                    .collect(),
            );
        }

        // Their ids are newest-first; continue from the first one we share.
        for id in other.last_block_ids() {
            if let Some(pos) = inner.chain.iter().position(|c| c == id) {
                return Some(
                    inner.chain[pos + 1..]
                        .iter()
                        .take(limit)
                        .map(|id| (ModifierType::Block, *id))
                        .collect(),
                );
            }
        }

        None
    }

    fn sync_info(&self) -> SyncInfo {
        let inner = self.inner.read();
        SyncInfo::new(
            inner
                .chain
                .iter()
                .rev()
                .take(SYNC_SUMMARY_IDS)
                .copied()
                .collect(),
        )
    }

    fn applicable_try(&self, block: &Block) -> Result<(), ApplicabilityError> {
        let inner = self.inner.read();
        let id = block.id();

        if inner.blocks.contains_key(&id) {
            return Err(ApplicabilityError::AlreadyApplied(id));
        }

        let parent = block.parent_id();
        if parent == ModifierId::ZERO {
            if !inner.chain.is_empty() {
                return Err(ApplicabilityError::MissingParent(parent));
            }
            if block.height() != 1 {
                return Err(ApplicabilityError::NonContiguousHeight {
                    parent: 0,
                    got: block.height(),
                });
            }
            return Ok(());
        }

        match inner.blocks.get(&parent) {
            None => Err(ApplicabilityError::MissingParent(parent)),
            Some(parent_block) => {
                // Only the current tip can be extended in a linear chain.
                if inner.chain.last() != Some(&parent) {
                    return Err(ApplicabilityError::MissingParent(parent));
                }
                if parent_block.height() + 1 != block.height() {
                    return Err(ApplicabilityError::NonContiguousHeight {
                        parent: parent_block.height(),
                        got: block.height(),
                    });
                }
                Ok(())
            }
        }
    }

    fn contains(&self, id: &ModifierId) -> bool {
        self.inner.read().blocks.contains_key(id)
    }

    fn modifier_by_id(&self, id: &ModifierId) -> Option<Block> {
        self.inner.read().blocks.get(id).cloned()
    }
}

/// In-memory transaction pool.
#[derive(Debug, Default)]
pub struct MemoryMempool {
    txs: DashMap<ModifierId, Transaction>,
}

impl MemoryMempool {
    /// Empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction, returning its id.
    pub fn put(&self, tx: Transaction) -> ModifierId {
        let id = tx.id();
        self.txs.insert(id, tx);
        id
    }

    /// Remove a transaction.
    pub fn remove(&self, id: &ModifierId) -> Option<Transaction> {
        self.txs.remove(id).map(|(_, tx)| tx)
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

impl MempoolReader for MemoryMempool {
    fn get_all(&self, ids: &[ModifierId]) -> Vec<Transaction> {
        ids.iter()
            .filter_map(|id| self.txs.get(id).map(|tx| tx.clone()))
            .collect()
    }

    fn contains(&self, id: &ModifierId) -> bool {
        self.txs.contains_key(id)
    }
}
