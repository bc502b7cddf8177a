//! Wire protocol: header, packet taxonomy, and the encrypted envelope.
//!
//! Layering, bottom-up:
//! 1. `packet` — typed payloads with little-endian `encode`/`decode`
//! 2. `header` — the fixed 24-byte header in front of every payload
//! 3. `frame` — AES-128-GCM envelope carrying `header ∥ payload`

pub mod frame;
pub mod header;
pub mod packet;

pub use header::{
    PacketHeader, HEADER_LEN, NIL_SESSION_ID, PACKET_MAGIC, PROTOCOL_VERSION, SESSION_ID_LEN,
};

pub use packet::{
    AuthenticationRequest, AuthenticationResponse, CloseSession, CreateDirRequest,
    CreateDirResponse, DownloadRequest, DownloadResponse, ErrorPacket, FileChunk, FileChunkAck,
    HandshakeRequest, HandshakeResponse, Packet, PacketType, RemoteFileEntry, ResumeRequest,
    ResumeResponse, UploadDirRequest, UploadRequest, UploadResponse, ViewCloudResponse,
    MAX_MESSAGE_LEN, MAX_PASSWORD_LEN, MAX_USERNAME_LEN,
};

pub use frame::{open, read_packet, seal, write_packet, PREFIX_LEN};
