//! The on-the-wire envelope.
//!
//! ```text
//! prefix:u32 LE | IV (12) | GCM tag (16) | ciphertext( header(24) | payload )
//! ```
//!
//! `prefix` counts everything after itself. Frames larger than the configured
//! bound are rejected before any allocation or decryption happens.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::{FrameCipher, IV_LEN, TAG_LEN};
use crate::error::{Result, TransferError};
use crate::protocol::header::{PacketHeader, HEADER_LEN, SESSION_ID_LEN};
use crate::protocol::packet::{Packet, PacketType};

/// Length of the frame prefix field.
pub const PREFIX_LEN: usize = 4;

/// Build one complete frame for `packet`, stamped with `session_id`.
pub fn seal(
    cipher: &FrameCipher,
    session_id: &[u8; SESSION_ID_LEN],
    packet: &Packet,
) -> Result<Bytes> {
    let payload = packet.encode_payload();

    let mut plain = BytesMut::with_capacity(HEADER_LEN + payload.len());
    PacketHeader::new(packet.packet_type(), *session_id, payload.len() as u32).encode(&mut plain);
    plain.put_slice(&payload);

    let (iv, tag, ciphertext) = cipher.seal(&plain)?;
    let body_len = IV_LEN + TAG_LEN + ciphertext.len();

    let mut frame = BytesMut::with_capacity(PREFIX_LEN + body_len);
    frame.put_u32_le(body_len as u32);
    frame.put_slice(&iv);
    frame.put_slice(&tag);
    frame.put_slice(&ciphertext);
    Ok(frame.freeze())
}

/// Decrypt and decode one frame body (everything after the prefix).
///
/// If the decrypted header names the error packet, its payload is decoded and
/// surfaced as [`TransferError::RemoteRejected`] no matter what the caller was
/// waiting for.
pub fn open(cipher: &FrameCipher, body: &[u8]) -> Result<(PacketHeader, Packet)> {
    if body.len() < IV_LEN + TAG_LEN {
        return Err(TransferError::malformed(format!(
            "frame body too short: {} bytes",
            body.len()
        )));
    }

    let (iv, rest) = body.split_at(IV_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);
    let plain = cipher.open(iv, tag, ciphertext)?;

    let mut plain = Bytes::from(plain);
    let header = PacketHeader::decode(&mut plain)?;

    if plain.remaining() < header.payload_len as usize {
        return Err(TransferError::malformed(format!(
            "payload truncated: {} of {} bytes",
            plain.remaining(),
            header.payload_len
        )));
    }
    let payload = plain.copy_to_bytes(header.payload_len as usize);

    if header.packet_type == PacketType::Error {
        let err = crate::protocol::packet::ErrorPacket::decode(payload)?;
        return Err(TransferError::rejected(err.error_code, err.message));
    }

    let packet = Packet::decode(header.packet_type, payload)?;
    Ok((header, packet))
}

/// Write one frame to `writer`. Used by in-process peers and tests; the
/// client's connection layer composes [`seal`] with its own retrying sends.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    cipher: &FrameCipher,
    session_id: &[u8; SESSION_ID_LEN],
    packet: &Packet,
) -> Result<()> {
    let frame = seal(cipher, session_id, packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame from `reader`, enforcing `max_frame_len` before reading the
/// body.
pub async fn read_packet<R: AsyncRead + Unpin>(
    reader: &mut R,
    cipher: &FrameCipher,
    max_frame_len: u32,
) -> Result<(PacketHeader, Packet)> {
    let mut prefix = [0u8; PREFIX_LEN];
    reader.read_exact(&mut prefix).await?;
    let body_len = u32::from_le_bytes(prefix);

    if body_len > max_frame_len {
        return Err(TransferError::malformed(format!(
            "frame of {body_len} bytes exceeds limit {max_frame_len}"
        )));
    }

    let mut body = vec![0u8; body_len as usize];
    reader.read_exact(&mut body).await?;
    open(cipher, &body)
}
