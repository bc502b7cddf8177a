//! Error taxonomy for the transfer client.
//!
//! Every fallible operation in the crate returns [`TransferError`]. Chunk-level
//! transient failures are retried inside the transfer engine; everything that
//! escapes to the caller is one of these variants.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Socket or file I/O failure below the framing layer.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A send or receive exceeded the configured socket timeout.
    #[error("i/o timed out after {0:?}")]
    IoTimeout(Duration),

    /// Peer-initiated half-close or zero-byte read. Fatal to the session.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Prefix, header, or payload failed validation: bad magic, bad version,
    /// truncated buffer, oversized frame, or an unexpected packet kind.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// GCM tag mismatch, or MD5 mismatch on a chunk or a whole file.
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    /// The server sent an error packet, or a response whose status signals
    /// denial. Carries the server's message verbatim.
    #[error("rejected by server (code {code}): {message}")]
    RemoteRejected { code: u32, message: String },

    /// A value overran its fixed wire field, or an argument is otherwise
    /// unusable before any I/O happens.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation requires state the session does not have, e.g.
    /// reconnecting without cached credentials.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// Resume was requested but no usable checkpoint exists at the path.
    #[error("no resumable state at {}", .0.display())]
    NoResumableState(PathBuf),

    /// A directory upload found nothing to send.
    #[error("no files found under {}", .0.display())]
    EmptyDirectory(PathBuf),
}

impl TransferError {
    /// Shorthand for a denial that quotes the server's message.
    pub(crate) fn rejected(code: u32, message: impl Into<String>) -> Self {
        TransferError::RemoteRejected {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        TransferError::MalformedPacket(message.into())
    }
}
