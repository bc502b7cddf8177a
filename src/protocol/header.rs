//! Fixed 24-byte packet header.
//!
//! Layout (little-endian):
//! `magic:u16 | version:u8 | type:u8 | session_id:[u8;16] | payload_len:u32`

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TransferError};
use crate::protocol::packet::PacketType;

/// Magic value every header starts with.
pub const PACKET_MAGIC: u16 = 0x5A57;

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u8 = 1;

/// Encoded header length in bytes.
pub const HEADER_LEN: usize = 24;

/// Session identifier length in bytes.
pub const SESSION_ID_LEN: usize = 16;

/// The all-zero identifier of an unauthenticated session.
pub const NIL_SESSION_ID: [u8; SESSION_ID_LEN] = [0u8; SESSION_ID_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub session_id: [u8; SESSION_ID_LEN],
    pub payload_len: u32,
}

impl PacketHeader {
    pub fn new(packet_type: PacketType, session_id: [u8; SESSION_ID_LEN], payload_len: u32) -> Self {
        Self {
            packet_type,
            session_id,
            payload_len,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN);
        buf.put_u16_le(PACKET_MAGIC);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.packet_type as u8);
        buf.put_slice(&self.session_id);
        buf.put_u32_le(self.payload_len);
    }

    /// Decode and validate one header. Magic and version are checked before
    /// anything else in the buffer is trusted.
    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < HEADER_LEN {
            return Err(TransferError::malformed(format!(
                "header truncated: {} of {HEADER_LEN} bytes",
                buf.remaining()
            )));
        }

        let magic = buf.get_u16_le();
        if magic != PACKET_MAGIC {
            return Err(TransferError::malformed(format!(
                "bad magic {magic:#06x}, expected {PACKET_MAGIC:#06x}"
            )));
        }

        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(TransferError::malformed(format!(
                "unsupported version {version}, expected {PROTOCOL_VERSION}"
            )));
        }

        let type_byte = buf.get_u8();
        let packet_type = PacketType::from_u8(type_byte)
            .ok_or_else(|| TransferError::malformed(format!("unknown packet type {type_byte}")))?;

        let mut session_id = [0u8; SESSION_ID_LEN];
        buf.copy_to_slice(&mut session_id);
        let payload_len = buf.get_u32_le();

        Ok(Self {
            packet_type,
            session_id,
            payload_len,
        })
    }
}
