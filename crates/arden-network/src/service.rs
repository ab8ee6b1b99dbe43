//! Contract between the synchronizer and the network controller.
//!
//! The synchronizer never talks to sockets. It emits [`NetworkCommand`]s on a
//! channel; the controller resolves [`SendTarget`]s against its connection
//! pool and performs the actual writes. Backpressure on the wire is the
//! controller's concern.

use crate::{Message, PeerId};

/// Addressing for an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTarget {
    /// Every connected peer.
    Broadcast,
    /// One specific peer.
    ToPeer(PeerId),
    /// A specific set of peers.
    ToPeers(Vec<PeerId>),
    /// One peer chosen at random by the network controller.
    Random,
}

/// Commands sent to the network controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCommand {
    /// Declare which message codes the sender wants routed to it.
    ///
    /// Issued once at startup; peer data arriving with other codes is not
    /// the synchronizer's business.
    RegisterMessagesHandler {
        /// Message codes to route.
        codes: Vec<u8>,
    },
    /// Send a message.
    SendMessage {
        /// The message.
        message: Message,
        /// Where to send it.
        target: SendTarget,
    },
}
