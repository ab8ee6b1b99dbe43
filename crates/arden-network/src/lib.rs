//! # arden-network
//!
//! Network-facing types for the Arden node view synchronizer:
//! - Gossip protocol messages (Inv / RequestModifier / Modifier / SyncInfo)
//!   with their wire codecs and stable message codes
//! - Peer identifiers and the connected-peer registry
//! - Penalty reasons, decaying peer scores, and the pluggable penalty hooks
//! - The command contract between the synchronizer and the network controller
//!
//! Transport concerns (framing, handshake, connection management) live in the
//! network controller and are out of scope here.

mod error;
mod message;
mod peer;
mod penalties;
mod scoring;
mod service;

pub use error::{NetworkError, NetworkResult};
pub use message::{InvData, Message, MessageType, ModifierItem, ModifierRequest, ModifiersData};
pub use peer::{ConnectedPeers, PeerBook, PeerId};
pub use penalties::{Penalties, PenaltyHandler, PenaltyReason};
pub use scoring::PeerScore;
pub use service::{NetworkCommand, SendTarget};

/// Hard upper bound on a single network message, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;
