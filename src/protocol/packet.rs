//! Packet taxonomy and payload serialization.
//!
//! One struct per packet kind, each with `encode`/`decode` over the
//! little-endian wire layout. Variable-length strings are u16-length-prefixed
//! and never null-terminated; credentials travel in fixed 64-byte fields and
//! denial messages in fixed 256-byte fields, both null-padded.
//!
//! Nothing here touches the network: payload bytes produced by `encode` are
//! framed and encrypted by `protocol::frame`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crypto::DIGEST_LEN;
use crate::error::{Result, TransferError};
use crate::protocol::header::SESSION_ID_LEN;

/// Fixed username field width.
pub const MAX_USERNAME_LEN: usize = 64;

/// Fixed password field width.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Fixed message field width in denied-response payloads.
pub const MAX_MESSAGE_LEN: usize = 256;

// =============================================================================
// Packet types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    HandshakeRequest = 0,
    HandshakeResponse = 1,
    AuthenticationRequest = 2,
    AuthenticationResponse = 3,
    CreateDirRequest = 4,
    CreateDirResponse = 5,
    ViewCloudRequest = 6,
    ViewCloudResponse = 7,
    UploadRequest = 8,
    UploadDirRequest = 9,
    UploadResponse = 10,
    DownloadRequest = 11,
    DownloadResponse = 12,
    ResumeRequest = 13,
    ResumeResponse = 14,
    FileChunk = 15,
    FileChunkAck = 16,
    CloseSession = 17,
    Error = 18,
}

impl PacketType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::HandshakeRequest),
            1 => Some(Self::HandshakeResponse),
            2 => Some(Self::AuthenticationRequest),
            3 => Some(Self::AuthenticationResponse),
            4 => Some(Self::CreateDirRequest),
            5 => Some(Self::CreateDirResponse),
            6 => Some(Self::ViewCloudRequest),
            7 => Some(Self::ViewCloudResponse),
            8 => Some(Self::UploadRequest),
            9 => Some(Self::UploadDirRequest),
            10 => Some(Self::UploadResponse),
            11 => Some(Self::DownloadRequest),
            12 => Some(Self::DownloadResponse),
            13 => Some(Self::ResumeRequest),
            14 => Some(Self::ResumeResponse),
            15 => Some(Self::FileChunk),
            16 => Some(Self::FileChunkAck),
            17 => Some(Self::CloseSession),
            18 => Some(Self::Error),
            _ => None,
        }
    }
}

// =============================================================================
// Field helpers
// =============================================================================

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u16_le(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn get_str(payload: &mut Bytes, what: &str) -> Result<String> {
    if payload.remaining() < 2 {
        return Err(TransferError::malformed(format!("{what} length truncated")));
    }
    let len = payload.get_u16_le() as usize;
    if payload.remaining() < len {
        return Err(TransferError::malformed(format!(
            "{what} truncated: {} of {len} bytes",
            payload.remaining()
        )));
    }
    String::from_utf8(payload.copy_to_bytes(len).to_vec())
        .map_err(|_| TransferError::malformed(format!("{what} is not valid UTF-8")))
}

/// Write `s` into a fixed `width`-byte field, null-padded; longer input is
/// cut at the field boundary.
fn put_fixed_str(buf: &mut BytesMut, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(width);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, width - len);
}

/// Read a fixed `width`-byte null-padded field back into a string.
fn get_fixed_str(payload: &mut Bytes, width: usize, what: &str) -> Result<String> {
    if payload.remaining() < width {
        return Err(TransferError::malformed(format!("{what} field truncated")));
    }
    let raw = payload.copy_to_bytes(width);
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    String::from_utf8(raw[..end].to_vec())
        .map_err(|_| TransferError::malformed(format!("{what} is not valid UTF-8")))
}

fn get_digest(payload: &mut Bytes, what: &str) -> Result<[u8; DIGEST_LEN]> {
    if payload.remaining() < DIGEST_LEN {
        return Err(TransferError::malformed(format!("{what} truncated")));
    }
    let mut digest = [0u8; DIGEST_LEN];
    payload.copy_to_slice(&mut digest);
    Ok(digest)
}

fn check_fixed(payload: &Bytes, needed: usize, what: &str) -> Result<()> {
    if payload.remaining() < needed {
        return Err(TransferError::malformed(format!(
            "{what} payload too short: {} of {needed} bytes",
            payload.remaining()
        )));
    }
    Ok(())
}

// =============================================================================
// HANDSHAKE_REQUEST (0) / HANDSHAKE_RESPONSE (1)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub client_version: u8,
}

impl HandshakeRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1);
        buf.put_u8(self.client_version);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 1, "HandshakeRequest")?;
        Ok(Self {
            client_version: payload.get_u8(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub server_version: u8,
    pub message: String,
}

impl HandshakeResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(3 + self.message.len());
        buf.put_u8(self.server_version);
        put_str(&mut buf, &self.message);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 1, "HandshakeResponse")?;
        let server_version = payload.get_u8();
        let message = get_str(&mut payload, "HandshakeResponse message")?;
        Ok(Self {
            server_version,
            message,
        })
    }
}

// =============================================================================
// AUTHENTICATION_REQUEST (2) / AUTHENTICATION_RESPONSE (3)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    username: String,
    password: String,
}

impl AuthenticationRequest {
    /// Fails with `InvalidArgument` if either credential overruns its fixed
    /// 64-byte wire field or contains an interior NUL (which the null-padded
    /// field could not represent).
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();

        if username.len() > MAX_USERNAME_LEN {
            return Err(TransferError::InvalidArgument(format!(
                "username exceeds {MAX_USERNAME_LEN} bytes"
            )));
        }
        if password.len() > MAX_PASSWORD_LEN {
            return Err(TransferError::InvalidArgument(format!(
                "password exceeds {MAX_PASSWORD_LEN} bytes"
            )));
        }
        if username.contains('\0') || password.contains('\0') {
            return Err(TransferError::InvalidArgument(
                "credentials must not contain NUL bytes".to_string(),
            ));
        }

        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAX_USERNAME_LEN + MAX_PASSWORD_LEN);
        put_fixed_str(&mut buf, &self.username, MAX_USERNAME_LEN);
        put_fixed_str(&mut buf, &self.password, MAX_PASSWORD_LEN);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        let username = get_fixed_str(&mut payload, MAX_USERNAME_LEN, "username")?;
        let password = get_fixed_str(&mut payload, MAX_PASSWORD_LEN, "password")?;
        Ok(Self { username, password })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResponse {
    pub authenticated: bool,
    pub session_id: [u8; SESSION_ID_LEN],
    pub message: String,
}

impl AuthenticationResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + SESSION_ID_LEN + 2 + self.message.len());
        buf.put_u8(self.authenticated as u8);
        buf.put_slice(&self.session_id);
        put_str(&mut buf, &self.message);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 1 + SESSION_ID_LEN, "AuthenticationResponse")?;
        let authenticated = payload.get_u8() != 0;
        let mut session_id = [0u8; SESSION_ID_LEN];
        payload.copy_to_slice(&mut session_id);
        let message = get_str(&mut payload, "AuthenticationResponse message")?;
        Ok(Self {
            authenticated,
            session_id,
            message,
        })
    }
}

// =============================================================================
// CREATE_DIR_REQUEST (4) / CREATE_DIR_RESPONSE (5)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDirRequest {
    pub dir_path: String,
}

impl CreateDirRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.dir_path.len());
        put_str(&mut buf, &self.dir_path);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        Ok(Self {
            dir_path: get_str(&mut payload, "CreateDirRequest path")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDirResponse {
    pub created: bool,
    pub message: String,
}

impl CreateDirResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(3 + self.message.len());
        buf.put_u8(self.created as u8);
        put_str(&mut buf, &self.message);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 1, "CreateDirResponse")?;
        let created = payload.get_u8() != 0;
        let message = get_str(&mut payload, "CreateDirResponse message")?;
        Ok(Self { created, message })
    }
}

// =============================================================================
// VIEW_CLOUD_REQUEST (6) / VIEW_CLOUD_RESPONSE (7)
// =============================================================================

/// One file or directory in the remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileEntry {
    pub size: u64,
    pub is_dir: bool,
    pub path: String,
    pub name: String,
}

impl RemoteFileEntry {
    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.size);
        buf.put_u8(self.is_dir as u8);
        buf.put_u16_le(self.path.len() as u16);
        buf.put_u16_le(self.name.len() as u16);
        buf.put_slice(self.path.as_bytes());
        buf.put_slice(self.name.as_bytes());
    }

    fn decode_from(payload: &mut Bytes) -> Result<Self> {
        check_fixed(payload, 8 + 1 + 2 + 2, "RemoteFileEntry")?;
        let size = payload.get_u64_le();
        let is_dir = payload.get_u8() != 0;
        let path_len = payload.get_u16_le() as usize;
        let name_len = payload.get_u16_le() as usize;
        check_fixed(payload, path_len + name_len, "RemoteFileEntry strings")?;

        let path = String::from_utf8(payload.copy_to_bytes(path_len).to_vec())
            .map_err(|_| TransferError::malformed("RemoteFileEntry path is not valid UTF-8"))?;
        let name = String::from_utf8(payload.copy_to_bytes(name_len).to_vec())
            .map_err(|_| TransferError::malformed("RemoteFileEntry name is not valid UTF-8"))?;

        Ok(Self {
            size,
            is_dir,
            path,
            name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCloudResponse {
    pub total_size: u64,
    pub entries: Vec<RemoteFileEntry>,
}

impl ViewCloudResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(12);
        buf.put_u32_le(self.entries.len() as u32);
        buf.put_u64_le(self.total_size);
        for entry in &self.entries {
            entry.encode_into(&mut buf);
        }
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 4 + 8, "ViewCloudResponse")?;
        let file_count = payload.get_u32_le() as usize;
        let total_size = payload.get_u64_le();

        let mut entries = Vec::with_capacity(file_count.min(1024));
        for _ in 0..file_count {
            entries.push(RemoteFileEntry::decode_from(&mut payload)?);
        }

        Ok(Self {
            total_size,
            entries,
        })
    }
}

// =============================================================================
// UPLOAD_REQUEST (8)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file_size: u64,
    pub checksum: [u8; DIGEST_LEN],
    pub file_name: String,
    pub file_type: String,
}

impl UploadRequest {
    /// An absent checksum (checksums disabled) is encoded as 16 zero bytes.
    pub fn new(
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        file_size: u64,
        checksum: Option<[u8; DIGEST_LEN]>,
    ) -> Self {
        Self {
            file_size,
            checksum: checksum.unwrap_or([0u8; DIGEST_LEN]),
            file_name: file_name.into(),
            file_type: file_type.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            8 + DIGEST_LEN + 4 + self.file_name.len() + self.file_type.len(),
        );
        buf.put_u64_le(self.file_size);
        buf.put_slice(&self.checksum);
        buf.put_u16_le(self.file_name.len() as u16);
        buf.put_u16_le(self.file_type.len() as u16);
        buf.put_slice(self.file_name.as_bytes());
        buf.put_slice(self.file_type.as_bytes());
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 8 + DIGEST_LEN + 4, "UploadRequest")?;
        let file_size = payload.get_u64_le();
        let checksum = get_digest(&mut payload, "UploadRequest checksum")?;
        let name_len = payload.get_u16_le() as usize;
        let type_len = payload.get_u16_le() as usize;
        check_fixed(&payload, name_len + type_len, "UploadRequest strings")?;

        let file_name = String::from_utf8(payload.copy_to_bytes(name_len).to_vec())
            .map_err(|_| TransferError::malformed("UploadRequest name is not valid UTF-8"))?;
        let file_type = String::from_utf8(payload.copy_to_bytes(type_len).to_vec())
            .map_err(|_| TransferError::malformed("UploadRequest type is not valid UTF-8"))?;

        Ok(Self {
            file_size,
            checksum,
            file_name,
            file_type,
        })
    }
}

// =============================================================================
// UPLOAD_DIR_REQUEST (9)
// =============================================================================

/// Announces a directory batch before its per-file uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDirRequest {
    pub file_count: u32,
    pub total_size: u64,
    pub verify_checksums: bool,
    pub dir_path: String,
}

impl UploadDirRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(15 + self.dir_path.len());
        buf.put_u32_le(self.file_count);
        buf.put_u64_le(self.total_size);
        buf.put_u8(self.verify_checksums as u8);
        put_str(&mut buf, &self.dir_path);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 4 + 8 + 1, "UploadDirRequest")?;
        let file_count = payload.get_u32_le();
        let total_size = payload.get_u64_le();
        let verify_checksums = payload.get_u8() != 0;
        let dir_path = get_str(&mut payload, "UploadDirRequest path")?;
        Ok(Self {
            file_count,
            total_size,
            verify_checksums,
            dir_path,
        })
    }
}

// =============================================================================
// UPLOAD_RESPONSE (10)
// =============================================================================

const UPLOAD_STATUS_ALLOWED: u8 = 0;
const UPLOAD_STATUS_OUT_OF_SPACE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResponse {
    Allowed { file_id: u32, chunk_size: u32 },
    OutOfSpace { message: String },
}

impl UploadResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + MAX_MESSAGE_LEN);
        match self {
            Self::Allowed {
                file_id,
                chunk_size,
            } => {
                buf.put_u8(UPLOAD_STATUS_ALLOWED);
                buf.put_u32_le(*file_id);
                buf.put_u32_le(*chunk_size);
            }
            Self::OutOfSpace { message } => {
                buf.put_u8(UPLOAD_STATUS_OUT_OF_SPACE);
                put_fixed_str(&mut buf, message, MAX_MESSAGE_LEN);
            }
        }
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 1, "UploadResponse")?;
        match payload.get_u8() {
            UPLOAD_STATUS_ALLOWED => {
                check_fixed(&payload, 8, "UploadResponse allowed body")?;
                Ok(Self::Allowed {
                    file_id: payload.get_u32_le(),
                    chunk_size: payload.get_u32_le(),
                })
            }
            UPLOAD_STATUS_OUT_OF_SPACE => Ok(Self::OutOfSpace {
                message: get_fixed_str(&mut payload, MAX_MESSAGE_LEN, "UploadResponse message")?,
            }),
            other => Err(TransferError::malformed(format!(
                "unknown upload status {other}"
            ))),
        }
    }
}

// =============================================================================
// DOWNLOAD_REQUEST (11) / DOWNLOAD_RESPONSE (12)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub file_name: String,
}

impl DownloadRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.file_name.len());
        put_str(&mut buf, &self.file_name);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        Ok(Self {
            file_name: get_str(&mut payload, "DownloadRequest name")?,
        })
    }
}

const DOWNLOAD_STATUS_FOUND: u8 = 0;
const DOWNLOAD_STATUS_NOT_FOUND: u8 = 1;
const DOWNLOAD_STATUS_ACCESS_DENIED: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResponse {
    Found {
        file_id: u32,
        file_size: u64,
        chunk_size: u32,
        checksum: [u8; DIGEST_LEN],
    },
    NotFound {
        message: String,
    },
    AccessDenied {
        message: String,
    },
}

impl DownloadResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + MAX_MESSAGE_LEN);
        match self {
            Self::Found {
                file_id,
                file_size,
                chunk_size,
                checksum,
            } => {
                buf.put_u8(DOWNLOAD_STATUS_FOUND);
                buf.put_u32_le(*file_id);
                buf.put_u64_le(*file_size);
                buf.put_u32_le(*chunk_size);
                buf.put_slice(checksum);
            }
            Self::NotFound { message } => {
                buf.put_u8(DOWNLOAD_STATUS_NOT_FOUND);
                put_fixed_str(&mut buf, message, MAX_MESSAGE_LEN);
            }
            Self::AccessDenied { message } => {
                buf.put_u8(DOWNLOAD_STATUS_ACCESS_DENIED);
                put_fixed_str(&mut buf, message, MAX_MESSAGE_LEN);
            }
        }
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 1, "DownloadResponse")?;
        match payload.get_u8() {
            DOWNLOAD_STATUS_FOUND => {
                check_fixed(&payload, 4 + 8 + 4 + DIGEST_LEN, "DownloadResponse body")?;
                let file_id = payload.get_u32_le();
                let file_size = payload.get_u64_le();
                let chunk_size = payload.get_u32_le();
                let checksum = get_digest(&mut payload, "DownloadResponse checksum")?;
                Ok(Self::Found {
                    file_id,
                    file_size,
                    chunk_size,
                    checksum,
                })
            }
            DOWNLOAD_STATUS_NOT_FOUND => Ok(Self::NotFound {
                message: get_fixed_str(&mut payload, MAX_MESSAGE_LEN, "DownloadResponse message")?,
            }),
            DOWNLOAD_STATUS_ACCESS_DENIED => Ok(Self::AccessDenied {
                message: get_fixed_str(&mut payload, MAX_MESSAGE_LEN, "DownloadResponse message")?,
            }),
            other => Err(TransferError::malformed(format!(
                "unknown download status {other}"
            ))),
        }
    }
}

// =============================================================================
// RESUME_REQUEST (13) / RESUME_RESPONSE (14)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeRequest {
    pub file_id: u32,
    /// Always 0 from this client; the server's view of progress is
    /// authoritative and comes back in the response.
    pub resume_position: u64,
    pub last_chunk_index: u32,
}

impl ResumeRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u32_le(self.file_id);
        buf.put_u64_le(self.resume_position);
        buf.put_u32_le(self.last_chunk_index);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 16, "ResumeRequest")?;
        Ok(Self {
            file_id: payload.get_u32_le(),
            resume_position: payload.get_u64_le(),
            last_chunk_index: payload.get_u32_le(),
        })
    }
}

const RESUME_STATUS_SUPPORTED: u8 = 0;
const RESUME_STATUS_NOT_FOUND: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeResponse {
    Supported {
        file_id: u32,
        resume_position: u64,
        remaining_chunks: u32,
    },
    NotFound {
        message: String,
    },
}

impl ResumeResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + MAX_MESSAGE_LEN);
        match self {
            Self::Supported {
                file_id,
                resume_position,
                remaining_chunks,
            } => {
                buf.put_u8(RESUME_STATUS_SUPPORTED);
                buf.put_u32_le(*file_id);
                buf.put_u64_le(*resume_position);
                buf.put_u32_le(*remaining_chunks);
            }
            Self::NotFound { message } => {
                buf.put_u8(RESUME_STATUS_NOT_FOUND);
                put_fixed_str(&mut buf, message, MAX_MESSAGE_LEN);
            }
        }
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 1, "ResumeResponse")?;
        match payload.get_u8() {
            RESUME_STATUS_SUPPORTED => {
                check_fixed(&payload, 16, "ResumeResponse body")?;
                Ok(Self::Supported {
                    file_id: payload.get_u32_le(),
                    resume_position: payload.get_u64_le(),
                    remaining_chunks: payload.get_u32_le(),
                })
            }
            RESUME_STATUS_NOT_FOUND => Ok(Self::NotFound {
                message: get_fixed_str(&mut payload, MAX_MESSAGE_LEN, "ResumeResponse message")?,
            }),
            other => Err(TransferError::malformed(format!(
                "unknown resume status {other}"
            ))),
        }
    }
}

// =============================================================================
// FILE_CHUNK (15) / FILE_CHUNK_ACK (16)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub file_id: u32,
    pub chunk_index: u32,
    /// MD5 of `data`; all zeros when checksums are disabled.
    pub checksum: [u8; DIGEST_LEN],
    pub data: Bytes,
}

impl FileChunk {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(12 + DIGEST_LEN + self.data.len());
        buf.put_u32_le(self.file_id);
        buf.put_u32_le(self.chunk_index);
        buf.put_u32_le(self.data.len() as u32);
        buf.put_slice(&self.checksum);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 12 + DIGEST_LEN, "FileChunk")?;
        let file_id = payload.get_u32_le();
        let chunk_index = payload.get_u32_le();
        let chunk_size = payload.get_u32_le() as usize;
        let checksum = get_digest(&mut payload, "FileChunk checksum")?;
        check_fixed(&payload, chunk_size, "FileChunk data")?;
        let data = payload.copy_to_bytes(chunk_size);

        Ok(Self {
            file_id,
            chunk_index,
            checksum,
            data,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileChunkAck {
    pub file_id: u32,
    pub chunk_index: u32,
    pub success: bool,
}

impl FileChunkAck {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(9);
        buf.put_u32_le(self.file_id);
        buf.put_u32_le(self.chunk_index);
        buf.put_u8(self.success as u8);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 9, "FileChunkAck")?;
        Ok(Self {
            file_id: payload.get_u32_le(),
            chunk_index: payload.get_u32_le(),
            success: payload.get_u8() != 0,
        })
    }
}

// =============================================================================
// CLOSE_SESSION (17) / ERROR (18)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseSession {
    /// Seconds since the Unix epoch, logged server-side.
    pub timestamp: u64,
}

impl CloseSession {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u64_le(self.timestamp);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 8, "CloseSession")?;
        Ok(Self {
            timestamp: payload.get_u64_le(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPacket {
    pub error_code: u32,
    pub message: String,
}

impl ErrorPacket {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6 + self.message.len());
        buf.put_u32_le(self.error_code);
        put_str(&mut buf, &self.message);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_fixed(&payload, 4, "ErrorPacket")?;
        let error_code = payload.get_u32_le();
        let message = get_str(&mut payload, "ErrorPacket message")?;
        Ok(Self {
            error_code,
            message,
        })
    }
}

// =============================================================================
// Packet sum type
// =============================================================================

/// One packet of any kind. Packets only exist decrypted in memory; the wire
/// never carries one in the clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    HandshakeRequest(HandshakeRequest),
    HandshakeResponse(HandshakeResponse),
    AuthenticationRequest(AuthenticationRequest),
    AuthenticationResponse(AuthenticationResponse),
    CreateDirRequest(CreateDirRequest),
    CreateDirResponse(CreateDirResponse),
    ViewCloudRequest,
    ViewCloudResponse(ViewCloudResponse),
    UploadRequest(UploadRequest),
    UploadDirRequest(UploadDirRequest),
    UploadResponse(UploadResponse),
    DownloadRequest(DownloadRequest),
    DownloadResponse(DownloadResponse),
    ResumeRequest(ResumeRequest),
    ResumeResponse(ResumeResponse),
    FileChunk(FileChunk),
    FileChunkAck(FileChunkAck),
    CloseSession(CloseSession),
    Error(ErrorPacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::HandshakeRequest(_) => PacketType::HandshakeRequest,
            Self::HandshakeResponse(_) => PacketType::HandshakeResponse,
            Self::AuthenticationRequest(_) => PacketType::AuthenticationRequest,
            Self::AuthenticationResponse(_) => PacketType::AuthenticationResponse,
            Self::CreateDirRequest(_) => PacketType::CreateDirRequest,
            Self::CreateDirResponse(_) => PacketType::CreateDirResponse,
            Self::ViewCloudRequest => PacketType::ViewCloudRequest,
            Self::ViewCloudResponse(_) => PacketType::ViewCloudResponse,
            Self::UploadRequest(_) => PacketType::UploadRequest,
            Self::UploadDirRequest(_) => PacketType::UploadDirRequest,
            Self::UploadResponse(_) => PacketType::UploadResponse,
            Self::DownloadRequest(_) => PacketType::DownloadRequest,
            Self::DownloadResponse(_) => PacketType::DownloadResponse,
            Self::ResumeRequest(_) => PacketType::ResumeRequest,
            Self::ResumeResponse(_) => PacketType::ResumeResponse,
            Self::FileChunk(_) => PacketType::FileChunk,
            Self::FileChunkAck(_) => PacketType::FileChunkAck,
            Self::CloseSession(_) => PacketType::CloseSession,
            Self::Error(_) => PacketType::Error,
        }
    }

    pub fn encode_payload(&self) -> Bytes {
        match self {
            Self::HandshakeRequest(p) => p.encode(),
            Self::HandshakeResponse(p) => p.encode(),
            Self::AuthenticationRequest(p) => p.encode(),
            Self::AuthenticationResponse(p) => p.encode(),
            Self::CreateDirRequest(p) => p.encode(),
            Self::CreateDirResponse(p) => p.encode(),
            Self::ViewCloudRequest => Bytes::new(),
            Self::ViewCloudResponse(p) => p.encode(),
            Self::UploadRequest(p) => p.encode(),
            Self::UploadDirRequest(p) => p.encode(),
            Self::UploadResponse(p) => p.encode(),
            Self::DownloadRequest(p) => p.encode(),
            Self::DownloadResponse(p) => p.encode(),
            Self::ResumeRequest(p) => p.encode(),
            Self::ResumeResponse(p) => p.encode(),
            Self::FileChunk(p) => p.encode(),
            Self::FileChunkAck(p) => p.encode(),
            Self::CloseSession(p) => p.encode(),
            Self::Error(p) => p.encode(),
        }
    }

    /// Decode a payload whose kind is already known from the header.
    pub fn decode(packet_type: PacketType, payload: Bytes) -> Result<Self> {
        Ok(match packet_type {
            PacketType::HandshakeRequest => {
                Self::HandshakeRequest(HandshakeRequest::decode(payload)?)
            }
            PacketType::HandshakeResponse => {
                Self::HandshakeResponse(HandshakeResponse::decode(payload)?)
            }
            PacketType::AuthenticationRequest => {
                Self::AuthenticationRequest(AuthenticationRequest::decode(payload)?)
            }
            PacketType::AuthenticationResponse => {
                Self::AuthenticationResponse(AuthenticationResponse::decode(payload)?)
            }
            PacketType::CreateDirRequest => Self::CreateDirRequest(CreateDirRequest::decode(payload)?),
            PacketType::CreateDirResponse => {
                Self::CreateDirResponse(CreateDirResponse::decode(payload)?)
            }
            PacketType::ViewCloudRequest => Self::ViewCloudRequest,
            PacketType::ViewCloudResponse => {
                Self::ViewCloudResponse(ViewCloudResponse::decode(payload)?)
            }
            PacketType::UploadRequest => Self::UploadRequest(UploadRequest::decode(payload)?),
            PacketType::UploadDirRequest => Self::UploadDirRequest(UploadDirRequest::decode(payload)?),
            PacketType::UploadResponse => Self::UploadResponse(UploadResponse::decode(payload)?),
            PacketType::DownloadRequest => Self::DownloadRequest(DownloadRequest::decode(payload)?),
            PacketType::DownloadResponse => {
                Self::DownloadResponse(DownloadResponse::decode(payload)?)
            }
            PacketType::ResumeRequest => Self::ResumeRequest(ResumeRequest::decode(payload)?),
            PacketType::ResumeResponse => Self::ResumeResponse(ResumeResponse::decode(payload)?),
            PacketType::FileChunk => Self::FileChunk(FileChunk::decode(payload)?),
            PacketType::FileChunkAck => Self::FileChunkAck(FileChunkAck::decode(payload)?),
            PacketType::CloseSession => Self::CloseSession(CloseSession::decode(payload)?),
            PacketType::Error => Self::Error(ErrorPacket::decode(payload)?),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: Packet) {
        let payload = packet.encode_payload();
        let decoded = Packet::decode(packet.packet_type(), payload).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_handshake_roundtrip() {
        roundtrip(Packet::HandshakeRequest(HandshakeRequest {
            client_version: 1,
        }));
        roundtrip(Packet::HandshakeResponse(HandshakeResponse {
            server_version: 1,
            message: "welcome".to_string(),
        }));
    }

    #[test]
    fn test_authentication_roundtrip() {
        roundtrip(Packet::AuthenticationRequest(
            AuthenticationRequest::new("alice", "wonderland").unwrap(),
        ));
        roundtrip(Packet::AuthenticationResponse(AuthenticationResponse {
            authenticated: true,
            session_id: [0xAB; SESSION_ID_LEN],
            message: "ok".to_string(),
        }));
    }

    #[test]
    fn test_authentication_request_is_fixed_width() {
        let req = AuthenticationRequest::new("alice", "wonderland").unwrap();
        assert_eq!(req.encode().len(), MAX_USERNAME_LEN + MAX_PASSWORD_LEN);
    }

    #[test]
    fn test_oversized_credentials_rejected() {
        let long = "x".repeat(MAX_USERNAME_LEN + 1);
        let err = AuthenticationRequest::new(long, "pw").unwrap_err();
        assert!(matches!(err, TransferError::InvalidArgument(_)));

        let long = "y".repeat(MAX_PASSWORD_LEN + 1);
        assert!(AuthenticationRequest::new("user", long).is_err());
    }

    #[test]
    fn test_create_dir_roundtrip() {
        roundtrip(Packet::CreateDirRequest(CreateDirRequest {
            dir_path: "backups/2026".to_string(),
        }));
        roundtrip(Packet::CreateDirResponse(CreateDirResponse {
            created: false,
            message: "already exists".to_string(),
        }));
    }

    #[test]
    fn test_view_cloud_roundtrip() {
        roundtrip(Packet::ViewCloudRequest);
        roundtrip(Packet::ViewCloudResponse(ViewCloudResponse {
            total_size: 1536,
            entries: vec![
                RemoteFileEntry {
                    size: 1024,
                    is_dir: false,
                    path: "docs/report.pdf".to_string(),
                    name: "report.pdf".to_string(),
                },
                RemoteFileEntry {
                    size: 512,
                    is_dir: true,
                    path: "docs".to_string(),
                    name: "docs".to_string(),
                },
            ],
        }));
    }

    #[test]
    fn test_upload_request_roundtrip() {
        roundtrip(Packet::UploadRequest(UploadRequest::new(
            "video.mkv",
            "File",
            987_654_321,
            Some([9u8; DIGEST_LEN]),
        )));
    }

    #[test]
    fn test_upload_request_absent_checksum_is_zeroed() {
        let req = UploadRequest::new("a.bin", "File", 10, None);
        assert_eq!(req.checksum, [0u8; DIGEST_LEN]);
    }

    #[test]
    fn test_upload_dir_request_roundtrip() {
        roundtrip(Packet::UploadDirRequest(UploadDirRequest {
            file_count: 10,
            total_size: 55 * 1024 * 1024,
            verify_checksums: true,
            dir_path: "photos/2025".to_string(),
        }));
    }

    #[test]
    fn test_upload_response_both_variants() {
        roundtrip(Packet::UploadResponse(UploadResponse::Allowed {
            file_id: 42,
            chunk_size: 65_536,
        }));
        roundtrip(Packet::UploadResponse(UploadResponse::OutOfSpace {
            message: "quota exceeded".to_string(),
        }));
    }

    #[test]
    fn test_denied_response_is_fixed_width() {
        let resp = UploadResponse::OutOfSpace {
            message: "no".to_string(),
        };
        assert_eq!(resp.encode().len(), 1 + MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_download_roundtrip() {
        roundtrip(Packet::DownloadRequest(DownloadRequest {
            file_name: "archive.tar".to_string(),
        }));
        roundtrip(Packet::DownloadResponse(DownloadResponse::Found {
            file_id: 3,
            file_size: 1_048_576,
            chunk_size: 65_536,
            checksum: [0x5A; DIGEST_LEN],
        }));
        roundtrip(Packet::DownloadResponse(DownloadResponse::NotFound {
            message: "no such file".to_string(),
        }));
        roundtrip(Packet::DownloadResponse(DownloadResponse::AccessDenied {
            message: "not yours".to_string(),
        }));
    }

    #[test]
    fn test_resume_roundtrip() {
        roundtrip(Packet::ResumeRequest(ResumeRequest {
            file_id: 7,
            resume_position: 0,
            last_chunk_index: 0,
        }));
        roundtrip(Packet::ResumeResponse(ResumeResponse::Supported {
            file_id: 7,
            resume_position: 524_288,
            remaining_chunks: 2,
        }));
        roundtrip(Packet::ResumeResponse(ResumeResponse::NotFound {
            message: "nothing pending".to_string(),
        }));
    }

    #[test]
    fn test_file_chunk_roundtrip() {
        let data = Bytes::from(vec![0x11u8; 4096]);
        roundtrip(Packet::FileChunk(FileChunk {
            file_id: 1,
            chunk_index: 15,
            checksum: crate::crypto::md5_bytes(&[0x11u8; 4096]),
            data,
        }));
    }

    #[test]
    fn test_empty_file_chunk_roundtrip() {
        roundtrip(Packet::FileChunk(FileChunk {
            file_id: 1,
            chunk_index: 0,
            checksum: crate::crypto::md5_bytes(b""),
            data: Bytes::new(),
        }));
    }

    #[test]
    fn test_file_chunk_ack_roundtrip() {
        roundtrip(Packet::FileChunkAck(FileChunkAck {
            file_id: 1,
            chunk_index: 3,
            success: false,
        }));
    }

    #[test]
    fn test_close_and_error_roundtrip() {
        roundtrip(Packet::CloseSession(CloseSession {
            timestamp: 1_754_000_000,
        }));
        roundtrip(Packet::Error(ErrorPacket {
            error_code: 500,
            message: "internal failure".to_string(),
        }));
    }

    #[test]
    fn test_truncated_payloads_rejected() {
        // Declared chunk size larger than the remaining bytes.
        let chunk = FileChunk {
            file_id: 1,
            chunk_index: 0,
            checksum: [0; DIGEST_LEN],
            data: Bytes::from_static(b"abcdef"),
        };
        let mut bytes = chunk.encode().to_vec();
        bytes.truncate(bytes.len() - 3);
        assert!(FileChunk::decode(Bytes::from(bytes)).is_err());

        // String field shorter than its declared length.
        let resp = HandshakeResponse {
            server_version: 1,
            message: "hello there".to_string(),
        };
        let mut bytes = resp.encode().to_vec();
        bytes.truncate(bytes.len() - 4);
        assert!(HandshakeResponse::decode(Bytes::from(bytes)).is_err());

        // Fixed-size payload missing bytes.
        assert!(ResumeRequest::decode(Bytes::from_static(&[0u8; 12])).is_err());
        assert!(FileChunkAck::decode(Bytes::from_static(&[0u8; 8])).is_err());
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(UploadResponse::decode(Bytes::from_static(&[9])).is_err());
        assert!(DownloadResponse::decode(Bytes::from_static(&[9])).is_err());
        assert!(ResumeResponse::decode(Bytes::from_static(&[9])).is_err());
    }

    #[test]
    fn test_packet_type_from_u8_covers_all_tags() {
        for tag in 0u8..=18 {
            let ty = PacketType::from_u8(tag).unwrap();
            assert_eq!(ty as u8, tag);
        }
        assert!(PacketType::from_u8(19).is_none());
        assert!(PacketType::from_u8(0xFF).is_none());
    }
}
