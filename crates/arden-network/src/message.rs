//! Gossip protocol messages.
//!
//! Four message kinds flow between synchronizers: a chain summary
//! (`SyncInfo`), an inventory announcement (`Inv`), a request for modifiers
//! (`RequestModifier`, same wire shape as `Inv`), and the modifier payloads
//! themselves (`Modifier`). Counts use VLQ encoding; ids are fixed 32 bytes.

use crate::{NetworkError, NetworkResult, MAX_MESSAGE_SIZE};
use arden_types::{ModifierId, SyncInfo, MODIFIER_ID_LENGTH};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// VLQ decode an unsigned integer from the front of the buffer.
fn vlq_decode(buf: &mut impl Buf) -> NetworkResult<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() {
            return Err(NetworkError::InvalidMessage("truncated VLQ".into()));
        }
        let byte = buf.get_u8();

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            break;
        }
        shift += 7;

        if shift > 63 {
            return Err(NetworkError::InvalidMessage("VLQ overflow".into()));
        }
    }

    Ok(result)
}

/// VLQ encode an unsigned integer.
fn vlq_encode(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Chain summary.
    SyncInfo = 65,
    /// Inventory announcement.
    Inv = 55,
    /// Request modifiers.
    RequestModifier = 22,
    /// Modifier payloads.
    Modifier = 33,
}

impl TryFrom<u8> for MessageType {
    type Error = NetworkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            65 => Ok(MessageType::SyncInfo),
            55 => Ok(MessageType::Inv),
            22 => Ok(MessageType::RequestModifier),
            33 => Ok(MessageType::Modifier),
            other => Err(NetworkError::UnknownMessageCode(other)),
        }
    }
}

/// Inventory announcement: modifier ids one party claims to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvData {
    /// Modifier type tag.
    pub type_id: u8,
    /// Announced modifier ids.
    pub ids: Vec<ModifierId>,
}

/// Request for modifiers; same wire shape as [`InvData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierRequest {
    /// Modifier type tag.
    pub type_id: u8,
    /// Requested modifier ids.
    pub ids: Vec<ModifierId>,
}

/// One delivered modifier: declared id plus its encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierItem {
    /// Declared modifier id.
    pub id: ModifierId,
    /// Encoded modifier bytes.
    pub data: Vec<u8>,
}

/// Modifier payloads of a single type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiersData {
    /// Modifier type tag.
    pub type_id: u8,
    /// Delivered modifiers.
    pub modifiers: Vec<ModifierItem>,
}

/// A gossip message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Chain summary.
    SyncInfo(SyncInfo),
    /// Inventory announcement.
    Inv(InvData),
    /// Request modifiers.
    RequestModifier(ModifierRequest),
    /// Modifier payloads.
    Modifier(ModifiersData),
}

impl Message {
    /// The message code.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::SyncInfo(_) => MessageType::SyncInfo,
            Message::Inv(_) => MessageType::Inv,
            Message::RequestModifier(_) => MessageType::RequestModifier,
            Message::Modifier(_) => MessageType::Modifier,
        }
    }

    /// Encode the message to bytes, code first.
    pub fn encode(&self) -> NetworkResult<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.message_type() as u8);

        match self {
            Message::SyncInfo(info) => {
                buf.extend_from_slice(&info.to_bytes());
            }
            Message::Inv(inv) => {
                encode_id_list(&mut buf, inv.type_id, &inv.ids);
            }
            Message::RequestModifier(req) => {
                encode_id_list(&mut buf, req.type_id, &req.ids);
            }
            Message::Modifier(data) => {
                buf.put_u8(data.type_id);
                vlq_encode(&mut buf, data.modifiers.len() as u64);
                for item in &data.modifiers {
                    buf.put_slice(item.id.as_ref());
                    vlq_encode(&mut buf, item.data.len() as u64);
                    buf.put_slice(&item.data);
                }
            }
        }

        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: buf.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(buf.freeze())
    }

    /// Decode a message from bytes.
    pub fn decode(mut bytes: Bytes) -> NetworkResult<Self> {
        if bytes.is_empty() {
            return Err(NetworkError::InvalidMessage("empty message".into()));
        }

        let msg_type = MessageType::try_from(bytes.get_u8())?;

        match msg_type {
            MessageType::SyncInfo => {
                let info = SyncInfo::parse(&bytes)
                    .map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;
                Ok(Message::SyncInfo(info))
            }
            MessageType::Inv => {
                let (type_id, ids) = decode_id_list(&mut bytes)?;
                Ok(Message::Inv(InvData { type_id, ids }))
            }
            MessageType::RequestModifier => {
                let (type_id, ids) = decode_id_list(&mut bytes)?;
                Ok(Message::RequestModifier(ModifierRequest { type_id, ids }))
            }
            MessageType::Modifier => {
                if !bytes.has_remaining() {
                    return Err(NetworkError::InvalidMessage("missing type id".into()));
                }
                let type_id = bytes.get_u8();
                let count = vlq_decode(&mut bytes)? as usize;

                let mut modifiers = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    if bytes.remaining() < MODIFIER_ID_LENGTH {
                        return Err(NetworkError::InvalidMessage(
                            "modifier id truncated".into(),
                        ));
                    }
                    let mut id = [0u8; MODIFIER_ID_LENGTH];
                    bytes.copy_to_slice(&mut id);

                    let len = vlq_decode(&mut bytes)? as usize;
                    if bytes.remaining() < len {
                        return Err(NetworkError::InvalidMessage(format!(
                            "modifier data truncated: expected {}, got {}",
                            len,
                            bytes.remaining()
                        )));
                    }
                    let data = bytes.copy_to_bytes(len).to_vec();
                    modifiers.push(ModifierItem {
                        id: ModifierId::new(id),
                        data,
                    });
                }
                Ok(Message::Modifier(ModifiersData { type_id, modifiers }))
            }
        }
    }
}

fn encode_id_list(buf: &mut BytesMut, type_id: u8, ids: &[ModifierId]) {
    buf.put_u8(type_id);
    vlq_encode(buf, ids.len() as u64);
    for id in ids {
        buf.put_slice(id.as_ref());
    }
}

fn decode_id_list(bytes: &mut Bytes) -> NetworkResult<(u8, Vec<ModifierId>)> {
    if !bytes.has_remaining() {
        return Err(NetworkError::InvalidMessage("missing type id".into()));
    }
    let type_id = bytes.get_u8();
    let count = vlq_decode(bytes)? as usize;

    if bytes.remaining() != count * MODIFIER_ID_LENGTH {
        return Err(NetworkError::InvalidMessage(format!(
            "id list truncated: declared {}, remaining {}",
            count,
            bytes.remaining() / MODIFIER_ID_LENGTH
        )));
    }

    let mut ids = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let mut id = [0u8; MODIFIER_ID_LENGTH];
        bytes.copy_to_slice(&mut id);
        ids.push(ModifierId::new(id));
    }
    Ok((type_id, ids))
}
