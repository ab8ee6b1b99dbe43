//! # arden-view
//!
//! Reader contracts between the node view holder and the synchronizer, plus
//! in-memory history and mempool implementations backing them.
//!
//! The synchronizer only ever sees read handles: the view holder owns the
//! actual history and mempool and emits fresh handles when they change.

mod memory;
mod readers;

pub use memory::{MemoryHistory, MemoryMempool};
pub use readers::{ApplicabilityError, ChainComparison, HistoryReader, MempoolReader};
