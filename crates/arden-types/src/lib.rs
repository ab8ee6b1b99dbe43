//! # arden-types
//!
//! Core types shared across the Arden node view synchronizer:
//! - Modifier identifiers and type tags
//! - Concrete modifiers (transactions and blocks) with content-derived ids
//! - The type-indexed modifier parser registry
//! - The chain summary exchanged between peers during sync

mod id;
mod modifier;
mod sync_info;

pub use id::{ModifierId, ModifierType, MODIFIER_ID_LENGTH};
pub use modifier::{Block, CodecError, Modifier, ModifierRegistry, ParseFn, Transaction};
pub use sync_info::SyncInfo;
