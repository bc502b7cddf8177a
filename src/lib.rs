//! zw — client for a resumable, encrypted, chunked file-transfer protocol.
//!
//! Every packet travels inside an AES-128-GCM envelope over plain TCP. A
//! session is a strictly sequential request/response dialog: handshake,
//! authenticate, then uploads, downloads, and resumes, each chunk
//! individually acknowledged and checkpointed to disk so interrupted
//! transfers pick up where the server left off.
//!
//! # Layers
//!
//! ```text
//! client            facade: login, upload, download, resume, batches
//!   batch           directory scan, ordering, worker pool
//!   transfer        upload/download/resume state machines, checkpoints
//!     net           connection (socket, timeouts, retries) + session
//!       protocol    packet codec, 24-byte header, encrypted envelope
//!         crypto    AES-128-GCM frame cipher, MD5 digests
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod net;
pub mod protocol;
pub mod transfer;

pub use batch::{BatchFailure, BatchReport, LocalFileEntry};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_SECRET_KEY, DEFAULT_SERVER_ADDR, MAX_ENCRYPTED_LEN};
pub use error::{Result, TransferError};
pub use net::{Connection, Session};
pub use transfer::{NullProgress, ProgressSink};
