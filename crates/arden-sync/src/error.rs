//! Sync error types.

use arden_types::ModifierId;
use thiserror::Error;

/// Sync errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The network command channel is closed.
    #[error("network command channel closed")]
    NetworkChannelClosed,

    /// The view holder channel is closed.
    #[error("view holder channel closed")]
    ViewChannelClosed,

    /// All delivery attempts for a modifier were used up.
    #[error("delivery attempts exhausted for {0}")]
    DeliveryAttemptsExhausted(ModifierId),

    /// A re-expect was issued for a modifier that is not awaiting delivery.
    #[error("modifier {0} is not awaiting delivery")]
    NotRequested(ModifierId),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
