//! TCP connection ownership: timeouts, full-length transfers, reconnect.
//!
//! A `Connection` owns the socket, the endpoint it was opened against, and
//! the frame cipher — the key is carried here explicitly rather than living
//! in process-wide state. Send and receive are blocking full-length
//! operations from the caller's point of view: they loop until every byte has
//! moved or the operation fails.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::config::ClientConfig;
use crate::crypto::FrameCipher;
use crate::error::{Result, TransferError};
use crate::protocol::frame;
use crate::protocol::header::{PacketHeader, SESSION_ID_LEN};
use crate::protocol::packet::{Packet, PacketType};

/// Transient-error retries per send/receive before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// Sleep grows by this step per retry: 100 ms, 200 ms, 300 ms.
const RETRY_SLEEP_STEP: Duration = Duration::from_millis(100);

pub struct Connection {
    stream: TcpStream,
    cipher: FrameCipher,
    server_addr: String,
    io_timeout: Duration,
    max_frame_len: u32,
}

impl Connection {
    /// Open a TCP connection to the configured server.
    pub async fn connect(cfg: &ClientConfig) -> Result<Self> {
        let stream = timeout(cfg.socket_timeout, TcpStream::connect(&cfg.server_addr))
            .await
            .map_err(|_| TransferError::IoTimeout(cfg.socket_timeout))??;
        let _ = stream.set_nodelay(true);

        tracing::info!(addr = %cfg.server_addr, "connected");

        Ok(Self {
            stream,
            cipher: FrameCipher::new(&cfg.secret_key),
            server_addr: cfg.server_addr.clone(),
            io_timeout: cfg.socket_timeout,
            max_frame_len: cfg.max_frame_len,
        })
    }

    /// Close the current socket and open a fresh one to the same endpoint.
    /// The session layer is responsible for re-authenticating afterwards.
    pub async fn reconnect(&mut self) -> Result<()> {
        let _ = self.stream.shutdown().await;

        let stream = timeout(self.io_timeout, TcpStream::connect(&self.server_addr))
            .await
            .map_err(|_| TransferError::IoTimeout(self.io_timeout))??;
        let _ = stream.set_nodelay(true);
        self.stream = stream;

        tracing::info!(addr = %self.server_addr, "reconnected");
        Ok(())
    }

    /// Shut the socket down. Errors on an already-dead socket are ignored.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }

    /// Write all of `data`, retrying transient failures up to
    /// [`MAX_ATTEMPTS`] times with linearly growing sleeps.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<()> {
        let mut sent = 0usize;
        let mut attempts = 0u32;

        while sent < data.len() {
            match timeout(self.io_timeout, self.stream.write(&data[sent..])).await {
                Err(_) => return Err(TransferError::IoTimeout(self.io_timeout)),
                Ok(Ok(0)) => return Err(TransferError::ConnectionClosed),
                Ok(Ok(n)) => sent += n,
                Ok(Err(e)) => {
                    if attempts == MAX_ATTEMPTS {
                        return Err(e.into());
                    }
                    attempts += 1;
                    tracing::warn!(attempt = attempts, error = %e, "send failed, retrying");
                    sleep(RETRY_SLEEP_STEP * attempts).await;
                }
            }
        }

        self.stream.flush().await?;
        Ok(())
    }

    /// Fill `buf` completely. A zero-byte read means the peer closed the
    /// stream and is fatal — it is never retried.
    pub async fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        let mut attempts = 0u32;

        while filled < buf.len() {
            match timeout(self.io_timeout, self.stream.read(&mut buf[filled..])).await {
                Err(_) => return Err(TransferError::IoTimeout(self.io_timeout)),
                Ok(Ok(0)) => return Err(TransferError::ConnectionClosed),
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => {
                    if attempts == MAX_ATTEMPTS {
                        return Err(e.into());
                    }
                    attempts += 1;
                    tracing::warn!(attempt = attempts, error = %e, "receive failed, retrying");
                    sleep(RETRY_SLEEP_STEP * attempts).await;
                }
            }
        }

        Ok(())
    }

    /// Seal `packet` under `session_id` and send the whole frame.
    pub async fn send_packet(
        &mut self,
        session_id: &[u8; SESSION_ID_LEN],
        packet: &Packet,
    ) -> Result<()> {
        let frame = frame::seal(&self.cipher, session_id, packet)?;
        self.send_all(&frame).await
    }

    /// Receive and decrypt the next frame, whatever its kind. A server error
    /// packet surfaces as `RemoteRejected` from here.
    pub async fn recv_packet(&mut self) -> Result<(PacketHeader, Packet)> {
        let mut prefix = [0u8; frame::PREFIX_LEN];
        self.recv_exact(&mut prefix).await?;
        let body_len = u32::from_le_bytes(prefix);

        if body_len > self.max_frame_len {
            return Err(TransferError::malformed(format!(
                "frame of {body_len} bytes exceeds limit {}",
                self.max_frame_len
            )));
        }

        let mut body = vec![0u8; body_len as usize];
        self.recv_exact(&mut body).await?;
        frame::open(&self.cipher, &body)
    }

    /// Receive the next frame and require it to be of `expected` kind.
    pub async fn recv_expect(&mut self, expected: PacketType) -> Result<Packet> {
        let (header, packet) = self.recv_packet().await?;
        if header.packet_type != expected {
            return Err(TransferError::malformed(format!(
                "expected {expected:?}, got {:?}",
                header.packet_type
            )));
        }
        Ok(packet)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server_addr", &self.server_addr)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}
