//! Synchronizer configuration.

use arden_network::MAX_MESSAGE_SIZE;
use std::time::Duration;

/// Sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Capacity of the out-of-order modifiers cache.
    pub max_modifiers_cache_size: usize,
    /// Per-attempt wait before a delivery check fires.
    pub delivery_timeout: Duration,
    /// Delivery attempts before a modifier id is forgotten.
    pub max_delivery_checks: u32,
    /// Upper bound on ids per Inv/RequestModifier message.
    pub max_inv_objects: usize,
    /// Upper bound on bytes per Modifier message.
    pub max_packet_size: usize,
    /// Period of the local chain-summary broadcast tick.
    pub sync_interval: Duration,
    /// Minimum gap between two outbound summaries to the same peer.
    pub sync_status_refresh: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_modifiers_cache_size: 1024,
            delivery_timeout: Duration::from_secs(10),
            max_delivery_checks: 2,
            max_inv_objects: 400,
            max_packet_size: MAX_MESSAGE_SIZE,
            sync_interval: Duration::from_secs(15),
            sync_status_refresh: Duration::from_secs(20),
        }
    }
}
