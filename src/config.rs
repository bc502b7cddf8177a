//! Client configuration.

use std::time::Duration;

/// Pre-shared AES-128-GCM key used until key exchange exists server-side.
pub const DEFAULT_SECRET_KEY: [u8; 16] = *b"84bba3a644f7eb97";

/// Default server endpoint.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:27015";

/// Largest accepted encrypted frame body (32 MiB + 512 KiB).
pub const MAX_ENCRYPTED_LEN: u32 = 32 * 1024 * 1024 + 512 * 1024;

/// Settings for a transfer client. `Default` matches the production server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the server.
    pub server_addr: String,

    /// 16-byte AES-128-GCM key shared with the server.
    pub secret_key: [u8; 16],

    /// Deadline applied to every socket send and receive.
    pub socket_timeout: Duration,

    /// Retries per chunk before the file is abandoned.
    pub chunk_retries: u32,

    /// Initial retry delay; doubles on every further retry of a chunk.
    pub backoff_base: Duration,

    /// Verify per-chunk MD5 and whole-file MD5.
    pub verify_checksums: bool,

    /// Worker fan-out for parallel directory uploads.
    pub parallel_workers: usize,

    /// Frames whose length prefix exceeds this are rejected unread.
    pub max_frame_len: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            secret_key: DEFAULT_SECRET_KEY,
            socket_timeout: Duration::from_secs(300),
            chunk_retries: 3,
            backoff_base: Duration::from_millis(1000),
            verify_checksums: true,
            parallel_workers: 4,
            max_frame_len: MAX_ENCRYPTED_LEN,
        }
    }
}

impl ClientConfig {
    /// Configuration pointed at `addr` with every other field at its default.
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            server_addr: addr.into(),
            ..Self::default()
        }
    }
}
