//! Chain summary exchanged between peers.
//!
//! The synchronizer core treats the summary as opaque apart from its wire
//! encoding; comparison against the local chain is the history's concern.

use crate::{CodecError, ModifierId, MODIFIER_ID_LENGTH};
use bytes::{Buf, BufMut};

/// Summary of the local chain tip(s): recent block ids, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncInfo {
    last_block_ids: Vec<ModifierId>,
}

impl SyncInfo {
    /// Summary of an empty chain.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a summary from recent block ids, newest first.
    pub fn new(last_block_ids: Vec<ModifierId>) -> Self {
        Self { last_block_ids }
    }

    /// Recent block ids, newest first.
    pub fn last_block_ids(&self) -> &[ModifierId] {
        &self.last_block_ids
    }

    /// The newest id in the summary, if any.
    pub fn best_id(&self) -> Option<ModifierId> {
        self.last_block_ids.first().copied()
    }

    /// Whether the summary describes an empty chain.
    pub fn is_empty(&self) -> bool {
        self.last_block_ids.is_empty()
    }

    /// Wire encoding: big-endian count, then 32-byte ids.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.last_block_ids.len() * MODIFIER_ID_LENGTH);
        buf.put_u16(self.last_block_ids.len() as u16);
        for id in &self.last_block_ids {
            buf.put_slice(id.as_ref());
        }
        buf
    }

    /// Parse a summary from wire bytes.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        let mut buf = data;
        if buf.remaining() < 2 {
            return Err(CodecError::Truncated {
                need: 2,
                have: buf.remaining(),
            });
        }
        let count = buf.get_u16() as usize;
        if buf.remaining() != count * MODIFIER_ID_LENGTH {
            return Err(CodecError::LengthMismatch {
                declared: count * MODIFIER_ID_LENGTH,
                remaining: buf.remaining(),
            });
        }
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let mut id = [0u8; MODIFIER_ID_LENGTH];
            buf.copy_to_slice(&mut id);
            ids.push(ModifierId::new(id));
        }
        Ok(Self {
            last_block_ids: ids,
        })
    }
}
