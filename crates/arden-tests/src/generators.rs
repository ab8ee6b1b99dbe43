//! Test data generators for integration tests.

use arden_network::{InvData, Message, ModifierItem, ModifierRequest, ModifiersData, PeerId};
use arden_types::{Block, ModifierId, ModifierType, Transaction};
use arden_view::MemoryHistory;

/// Deterministic peer identity from a seed.
pub fn peer(seed: u8) -> PeerId {
    PeerId::from_bytes(vec![seed; 4])
}

/// Deterministic modifier id from a seed.
pub fn raw_id(seed: u8) -> ModifierId {
    let mut id = [0u8; 32];
    id[0] = seed;
    id[31] = seed.wrapping_mul(7);
    ModifierId::new(id)
}

/// Transaction with a seeded payload.
pub fn tx(seed: u8) -> Transaction {
    Transaction::new(vec![seed; 16])
}

/// Block extending `parent` at `height` with a seeded body.
pub fn block_child(parent: ModifierId, height: u32, seed: u8) -> Block {
    Block::new(parent, height, vec![seed; 8])
}

/// Apply a fresh chain of `len` blocks to `history` and return the blocks.
pub fn chain(history: &MemoryHistory, len: u32) -> Vec<Block> {
    let mut parent = ModifierId::ZERO;
    let mut blocks = Vec::new();
    for height in 1..=len {
        let block = block_child(parent, height, height as u8);
        parent = history.apply(block.clone()).expect("chain extends");
        blocks.push(block);
    }
    blocks
}

/// Inv message announcing block ids.
pub fn block_inv(ids: Vec<ModifierId>) -> Message {
    Message::Inv(InvData {
        type_id: ModifierType::Block.to_byte(),
        ids,
    })
}

/// Request message asking for block ids.
pub fn block_request(ids: Vec<ModifierId>) -> Message {
    Message::RequestModifier(ModifierRequest {
        type_id: ModifierType::Block.to_byte(),
        ids,
    })
}

/// Modifier message delivering blocks under their true ids.
pub fn block_modifiers(blocks: &[Block]) -> Message {
    Message::Modifier(ModifiersData {
        type_id: ModifierType::Block.to_byte(),
        modifiers: blocks
            .iter()
            .map(|b| ModifierItem {
                id: b.id(),
                data: b.to_bytes(),
            })
            .collect(),
    })
}

/// Modifier message delivering arbitrary bytes under a declared id.
pub fn raw_block_modifiers(items: Vec<(ModifierId, Vec<u8>)>) -> Message {
    Message::Modifier(ModifiersData {
        type_id: ModifierType::Block.to_byte(),
        modifiers: items
            .into_iter()
            .map(|(id, data)| ModifierItem { id, data })
            .collect(),
    })
}

/// Modifier message delivering transactions under their true ids.
pub fn tx_modifiers(txs: &[Transaction]) -> Message {
    Message::Modifier(ModifiersData {
        type_id: ModifierType::Transaction.to_byte(),
        modifiers: txs
            .iter()
            .map(|t| ModifierItem {
                id: t.id(),
                data: t.to_bytes(),
            })
            .collect(),
    })
}
