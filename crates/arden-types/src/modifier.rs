//! Concrete modifiers and the type-indexed parser registry.
//!
//! Ids are content-derived: the Blake2b-256 hash of the canonical encoding.
//! A peer that declares one id but ships bytes hashing to another is caught
//! by comparing the declared id against [`Modifier::id`].

use crate::{ModifierId, ModifierType, MODIFIER_ID_LENGTH};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use bytes::{Buf, BufMut};
use std::collections::HashMap;
use thiserror::Error;

/// Modifier encoding/decoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload was empty where content is required.
    #[error("empty payload")]
    EmptyPayload,

    /// Input ended before the declared structure was complete.
    #[error("truncated input: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    /// Declared length disagrees with the remaining input.
    #[error("length mismatch: declared {declared}, remaining {remaining}")]
    LengthMismatch { declared: usize, remaining: usize },
}

/// Compute the Blake2b-256 content id of an encoded modifier.
fn content_id(bytes: &[u8]) -> ModifierId {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(bytes);
    ModifierId::new(hasher.finalize().into())
}

/// An ephemeral transaction destined for the mempool.
///
/// The payload is opaque to the synchronizer; validation happens in the view
/// holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    payload: Vec<u8>,
}

impl Transaction {
    /// Create a transaction from its opaque payload.
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Content-derived transaction id.
    pub fn id(&self) -> ModifierId {
        content_id(&self.payload)
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Canonical wire encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.payload.clone()
    }

    /// Parse a transaction from wire bytes.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.is_empty() {
            return Err(CodecError::EmptyPayload);
        }
        Ok(Self {
            payload: data.to_vec(),
        })
    }
}

/// A persistent modifier: a block applied to history.
///
/// Carries the parent link and height used for applicability checks; the
/// block body stays opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    parent_id: ModifierId,
    height: u32,
    payload: Vec<u8>,
}

impl Block {
    /// Create a block from its parts.
    pub fn new(parent_id: ModifierId, height: u32, payload: Vec<u8>) -> Self {
        Self {
            parent_id,
            height,
            payload,
        }
    }

    /// Content-derived block id.
    pub fn id(&self) -> ModifierId {
        content_id(&self.to_bytes())
    }

    /// Id of the parent block.
    pub fn parent_id(&self) -> ModifierId {
        self.parent_id
    }

    /// Block height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Opaque body bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Canonical wire encoding: parent id, big-endian height, body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MODIFIER_ID_LENGTH + 8 + self.payload.len());
        buf.put_slice(self.parent_id.as_ref());
        buf.put_u32(self.height);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse a block from wire bytes.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        let mut buf = data;
        if buf.remaining() < MODIFIER_ID_LENGTH + 8 {
            return Err(CodecError::Truncated {
                need: MODIFIER_ID_LENGTH + 8,
                have: buf.remaining(),
            });
        }
        let mut parent = [0u8; MODIFIER_ID_LENGTH];
        buf.copy_to_slice(&mut parent);
        let height = buf.get_u32();
        let len = buf.get_u32() as usize;
        if buf.remaining() != len {
            return Err(CodecError::LengthMismatch {
                declared: len,
                remaining: buf.remaining(),
            });
        }
        Ok(Self {
            parent_id: ModifierId::new(parent),
            height,
            payload: buf.to_vec(),
        })
    }
}

/// Either kind of modifier, as produced by the parser registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    /// An ephemeral transaction.
    Transaction(Transaction),
    /// A persistent block.
    Block(Block),
}

impl Modifier {
    /// Content-derived id of the wrapped modifier.
    pub fn id(&self) -> ModifierId {
        match self {
            Modifier::Transaction(tx) => tx.id(),
            Modifier::Block(block) => block.id(),
        }
    }

    /// Wire type tag of the wrapped modifier.
    pub fn type_id(&self) -> u8 {
        match self {
            Modifier::Transaction(_) => ModifierType::Transaction.to_byte(),
            Modifier::Block(_) => ModifierType::Block.to_byte(),
        }
    }
}

/// Parser function for one modifier class.
pub type ParseFn = fn(&[u8]) -> Result<Modifier, CodecError>;

/// Type-indexed table of modifier parsers.
///
/// Payloads arriving with a tag that has no registered parser are discarded
/// at the framing level.
#[derive(Debug, Clone)]
pub struct ModifierRegistry {
    parsers: HashMap<u8, ParseFn>,
}

impl ModifierRegistry {
    /// Registry with no parsers.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registry covering the standard modifier classes.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(ModifierType::Transaction.to_byte(), |data| {
            Transaction::parse(data).map(Modifier::Transaction)
        });
        registry.register(ModifierType::Block.to_byte(), |data| {
            Block::parse(data).map(Modifier::Block)
        });
        registry
    }

    /// Register a parser for a type tag, replacing any previous entry.
    pub fn register(&mut self, type_id: u8, parser: ParseFn) {
        self.parsers.insert(type_id, parser);
    }

    /// Whether a parser is registered for the tag.
    pub fn contains(&self, type_id: u8) -> bool {
        self.parsers.contains_key(&type_id)
    }

    /// Look up the parser for a tag.
    pub fn parser(&self, type_id: u8) -> Option<ParseFn> {
        self.parsers.get(&type_id).copied()
    }
}

impl Default for ModifierRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_is_stable() {
        let tx = Transaction::new(vec![1, 2, 3]);
        assert_eq!(tx.id(), tx.id());
        assert_ne!(tx.id(), Transaction::new(vec![1, 2, 4]).id());
    }

    #[test]
    fn test_transaction_rejects_empty_payload() {
        assert_eq!(Transaction::parse(&[]), Err(CodecError::EmptyPayload));
    }

    #[test]
    fn test_block_roundtrip() {
        let block = Block::new(ModifierId::new([9u8; 32]), 42, vec![5, 6, 7]);
        let parsed = Block::parse(&block.to_bytes()).unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.id(), block.id());
    }

    #[test]
    fn test_block_parse_truncated() {
        let block = Block::new(ModifierId::ZERO, 1, vec![1; 16]);
        let bytes = block.to_bytes();
        assert!(matches!(
            Block::parse(&bytes[..10]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            Block::parse(&bytes[..bytes.len() - 1]),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = ModifierRegistry::standard();
        let tx = Transaction::new(vec![1, 2, 3]);

        let parser = registry
            .parser(ModifierType::Transaction.to_byte())
            .unwrap();
        let parsed = parser(&tx.to_bytes()).unwrap();
        assert_eq!(parsed.id(), tx.id());

        assert!(!registry.contains(108));
        assert!(registry.parser(108).is_none());
    }
}
