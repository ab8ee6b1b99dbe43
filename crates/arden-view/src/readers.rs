//! Read-only capabilities the synchronizer requires from the node view.

use arden_types::{Block, ModifierId, ModifierType, SyncInfo, Transaction};
use std::fmt;
use thiserror::Error;

/// Result of comparing a peer's chain summary against the local chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainComparison {
    /// Not compared yet.
    Unknown,
    /// The peer is behind us.
    Younger,
    /// Same tip.
    Equal,
    /// We are behind the peer.
    Older,
    /// The summaries are incomparable.
    Nonsense,
}

impl fmt::Display for ChainComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Younger => write!(f, "younger"),
            Self::Equal => write!(f, "equal"),
            Self::Older => write!(f, "older"),
            Self::Nonsense => write!(f, "nonsense"),
        }
    }
}

/// Why a block cannot be applied to history.
///
/// Recoverable failures mean dependencies are missing and the block should
/// wait in the cache; permanent failures mean the block is rejected for good.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplicabilityError {
    /// The parent block is not in history yet.
    #[error("parent {0} not known")]
    MissingParent(ModifierId),

    /// The declared height does not follow the parent's height.
    #[error("height {got} does not follow parent height {parent}")]
    NonContiguousHeight {
        /// Height of the parent in history.
        parent: u32,
        /// Height declared by the block.
        got: u32,
    },

    /// The block is already part of history.
    #[error("block {0} already applied")]
    AlreadyApplied(ModifierId),
}

impl ApplicabilityError {
    /// Whether the failure is permanent (the block can never apply).
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::MissingParent(_) => false,
            Self::NonContiguousHeight { .. } | Self::AlreadyApplied(_) => true,
        }
    }
}

/// Read handle over chain history.
pub trait HistoryReader: Send + Sync + fmt::Debug {
    /// Compare a peer's summary against the local chain.
    fn compare(&self, other: &SyncInfo) -> ChainComparison;

    /// Ids the peer is missing, oldest first, up to `limit`.
    ///
    /// `None` when no common point exists to continue from.
    fn continuation_ids(
        &self,
        other: &SyncInfo,
        limit: usize,
    ) -> Option<Vec<(ModifierType, ModifierId)>>;

    /// Summary of the local chain.
    fn sync_info(&self) -> SyncInfo;

    /// Whether the block could be applied right now.
    fn applicable_try(&self, block: &Block) -> Result<(), ApplicabilityError>;

    /// Whether the id is part of history.
    fn contains(&self, id: &ModifierId) -> bool;

    /// Fetch a block by id.
    fn modifier_by_id(&self, id: &ModifierId) -> Option<Block>;
}

/// Read handle over the mempool.
pub trait MempoolReader: Send + Sync + fmt::Debug {
    /// Fetch all known transactions among `ids`, in request order.
    fn get_all(&self, ids: &[ModifierId]) -> Vec<Transaction>;

    /// Whether the transaction is in the pool.
    fn contains(&self, id: &ModifierId) -> bool;
}
