//! Modifier identifiers and type tags.

use std::fmt;

/// Length of a modifier identifier in bytes.
pub const MODIFIER_ID_LENGTH: usize = 32;

/// Opaque fixed-width identifier of a modifier (transaction or block).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModifierId([u8; MODIFIER_ID_LENGTH]);

impl ModifierId {
    /// The all-zero id, used as the parent of the first block.
    pub const ZERO: ModifierId = ModifierId([0u8; MODIFIER_ID_LENGTH]);

    /// Create an id from raw bytes.
    pub const fn new(bytes: [u8; MODIFIER_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create an id from a byte slice, if it has the right length.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; MODIFIER_ID_LENGTH]>::try_from(slice).ok().map(Self)
    }

    /// Raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8; MODIFIER_ID_LENGTH] {
        &self.0
    }
}

impl AsRef<[u8]> for ModifierId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; MODIFIER_ID_LENGTH]> for ModifierId {
    fn from(bytes: [u8; MODIFIER_ID_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ModifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ModifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModifierId({})", hex::encode(self.0))
    }
}

/// Modifier class tags carried on the wire.
///
/// `Transaction` is the one ephemeral class; every other tag denotes a
/// persistent modifier applied to history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModifierType {
    /// Mempool transaction.
    Transaction = 2,
    /// Full block.
    Block = 102,
}

impl ModifierType {
    /// Create from the wire byte, if known.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            2 => Some(Self::Transaction),
            102 => Some(Self::Block),
            _ => None,
        }
    }

    /// Convert to the wire byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether this tag denotes the transaction class.
    pub fn is_transaction(self) -> bool {
        matches!(self, Self::Transaction)
    }
}
