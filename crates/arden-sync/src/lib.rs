//! # arden-sync
//!
//! The node view synchronizer: keeps the local node's view (chain history
//! and mempool) consistent with gossip peers.
//!
//! This crate provides:
//! - Per-modifier delivery tracking with retries and timeouts
//! - Per-peer sync status and periodic chain-summary broadcast
//! - A bounded cache for out-of-order persistent modifiers
//! - The orchestrating event loop consuming peer messages and view events

mod cache;
mod config;
mod delivery;
mod error;
mod synchronizer;
mod tracker;

pub use cache::ModifiersCache;
pub use config::SyncConfig;
pub use delivery::{DeliveryTracker, ModifierStatus};
pub use error::{SyncError, SyncResult};
pub use synchronizer::{CacheHandle, SyncEvent, Synchronizer, ViewCommand};
pub use tracker::SyncTracker;

/// Capacity of the synchronizer's inbound event queue.
pub const EVENT_QUEUE_SIZE: usize = 1024;
