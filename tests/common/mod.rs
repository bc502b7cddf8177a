//! In-process peer for integration tests.
//!
//! Implements the server half of the protocol over loopback TCP with the
//! same codec the client uses, plus fault injection: negative acks for
//! chosen upload chunks and corrupted digests for chosen download chunks.
//! State is shared across connections so resume and parallel scenarios can
//! assert on what the "server" ended up holding.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};

use zw::config::ClientConfig;
use zw::crypto::{md5_bytes, FrameCipher, DIGEST_LEN};
use zw::protocol::frame;
use zw::protocol::header::NIL_SESSION_ID;
use zw::protocol::packet::{
    AuthenticationResponse, DownloadResponse, FileChunk, FileChunkAck, HandshakeResponse, Packet,
    RemoteFileEntry, ResumeResponse, UploadResponse, ViewCloudResponse,
};
use zw::Result;

pub const TEST_USER: &str = "alice";
pub const TEST_PASSWORD: &str = "wonderland";
pub const WELCOME: &str = "welcome to the vault";

/// An upload in flight or finished.
#[derive(Debug)]
pub struct UploadSlot {
    pub name: String,
    pub size: u64,
    pub chunk_size: u32,
    pub data: Vec<u8>,
    pub chunks_received: u32,
}

/// A download being streamed to some client.
#[derive(Debug)]
pub struct DownloadSlot {
    pub name: String,
    pub data: Vec<u8>,
    pub acked_chunks: u32,
}

#[derive(Debug, Default)]
pub struct ServerState {
    next_file_id: u32,
    pub uploads: HashMap<u32, UploadSlot>,
    pub downloads: HashMap<u32, DownloadSlot>,
    /// Fully received files by remote name.
    pub completed: HashMap<String, Vec<u8>>,
    pub sessions_opened: u32,
}

impl ServerState {
    fn next_id(&mut self) -> u32 {
        self.next_file_id += 1;
        self.next_file_id
    }
}

pub struct MockServer {
    pub addr: String,
    pub state: Arc<Mutex<ServerState>>,
    /// `(chunk_index, remaining)`: upload acks for that index come back
    /// negative while `remaining > 0`.
    pub nack: Arc<Mutex<Option<(u32, u32)>>>,
    /// `(chunk_index, remaining)`: download chunks for that index carry a
    /// corrupted digest while `remaining > 0`.
    pub corrupt: Arc<Mutex<Option<(u32, u32)>>>,
    chunk_size: u32,
    /// Files served for download, by remote name.
    pub servable: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockServer {
    /// Client configuration pointed at this server, with fast backoff so
    /// retry scenarios stay quick.
    pub fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::with_addr(self.addr.clone());
        cfg.socket_timeout = std::time::Duration::from_secs(10);
        cfg.backoff_base = std::time::Duration::from_millis(5);
        cfg
    }

    pub fn stored(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().completed.get(name).cloned()
    }

    pub fn sessions_opened(&self) -> u32 {
        self.state.lock().unwrap().sessions_opened
    }

    pub fn serve_file(&self, name: &str, data: Vec<u8>) {
        self.servable
            .lock()
            .unwrap()
            .insert(name.to_string(), data);
    }

    pub fn set_nack(&self, chunk_index: u32, times: u32) {
        *self.nack.lock().unwrap() = Some((chunk_index, times));
    }

    pub fn set_corrupt(&self, chunk_index: u32, times: u32) {
        *self.corrupt.lock().unwrap() = Some((chunk_index, times));
    }
}

/// Start a server with the given advertised chunk size.
pub async fn start_server(chunk_size: u32) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = MockServer {
        addr,
        state: Arc::new(Mutex::new(ServerState::default())),
        nack: Arc::new(Mutex::new(None)),
        corrupt: Arc::new(Mutex::new(None)),
        chunk_size,
        servable: Arc::new(Mutex::new(HashMap::new())),
    };

    let state = Arc::clone(&server.state);
    let nack = Arc::clone(&server.nack);
    let corrupt = Arc::clone(&server.corrupt);
    let servable = Arc::clone(&server.servable);

    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                break;
            };
            let peer = Peer {
                cipher: FrameCipher::new(&ClientConfig::default().secret_key),
                state: Arc::clone(&state),
                nack: Arc::clone(&nack),
                corrupt: Arc::clone(&corrupt),
                servable: Arc::clone(&servable),
                chunk_size,
            };
            tokio::spawn(async move {
                let _ = peer.run(sock).await;
            });
        }
    });

    server
}

struct Peer {
    cipher: FrameCipher,
    state: Arc<Mutex<ServerState>>,
    nack: Arc<Mutex<Option<(u32, u32)>>>,
    corrupt: Arc<Mutex<Option<(u32, u32)>>>,
    servable: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    chunk_size: u32,
}

impl Peer {
    async fn run(&self, mut sock: TcpStream) -> Result<()> {
        let mut carry: Option<Packet> = None;

        loop {
            let packet = match carry.take() {
                Some(p) => p,
                None => match frame::read_packet(&mut sock, &self.cipher, u32::MAX).await {
                    Ok((_, p)) => p,
                    Err(_) => return Ok(()),
                },
            };

            match packet {
                Packet::HandshakeRequest(_) => {
                    self.reply(
                        &mut sock,
                        &Packet::HandshakeResponse(HandshakeResponse {
                            server_version: 1,
                            message: WELCOME.to_string(),
                        }),
                    )
                    .await?;
                }

                Packet::AuthenticationRequest(req) => {
                    let ok = req.username() == TEST_USER && req.password() == TEST_PASSWORD;
                    if ok {
                        self.state.lock().unwrap().sessions_opened += 1;
                    }
                    let resp = AuthenticationResponse {
                        authenticated: ok,
                        session_id: if ok { [0x42; 16] } else { NIL_SESSION_ID },
                        message: if ok { "ok" } else { "bad credentials" }.to_string(),
                    };
                    self.reply(&mut sock, &Packet::AuthenticationResponse(resp))
                        .await?;
                }

                Packet::UploadDirRequest(_) => {
                    self.reply(
                        &mut sock,
                        &Packet::UploadResponse(UploadResponse::Allowed {
                            file_id: 0,
                            chunk_size: self.chunk_size,
                        }),
                    )
                    .await?;
                }

                Packet::UploadRequest(req) => {
                    let file_id = {
                        let mut state = self.state.lock().unwrap();
                        let id = state.next_id();
                        state.uploads.insert(
                            id,
                            UploadSlot {
                                name: req.file_name.clone(),
                                size: req.file_size,
                                chunk_size: self.chunk_size,
                                data: Vec::with_capacity(req.file_size as usize),
                                chunks_received: 0,
                            },
                        );
                        id
                    };
                    self.reply(
                        &mut sock,
                        &Packet::UploadResponse(UploadResponse::Allowed {
                            file_id,
                            chunk_size: self.chunk_size,
                        }),
                    )
                    .await?;
                }

                Packet::FileChunk(chunk) => {
                    let ack = self.accept_chunk(&chunk);
                    self.reply(&mut sock, &Packet::FileChunkAck(ack)).await?;
                }

                Packet::DownloadRequest(req) => {
                    let data = self.servable.lock().unwrap().get(&req.file_name).cloned();
                    match data {
                        None => {
                            self.reply(
                                &mut sock,
                                &Packet::DownloadResponse(DownloadResponse::NotFound {
                                    message: format!("{} is not stored here", req.file_name),
                                }),
                            )
                            .await?;
                        }
                        Some(data) => {
                            let file_id = {
                                let mut state = self.state.lock().unwrap();
                                let id = state.next_id();
                                state.downloads.insert(
                                    id,
                                    DownloadSlot {
                                        name: req.file_name.clone(),
                                        data: data.clone(),
                                        acked_chunks: 0,
                                    },
                                );
                                id
                            };
                            self.reply(
                                &mut sock,
                                &Packet::DownloadResponse(DownloadResponse::Found {
                                    file_id,
                                    file_size: data.len() as u64,
                                    chunk_size: self.chunk_size,
                                    checksum: md5_bytes(&data),
                                }),
                            )
                            .await?;

                            carry = self.stream_download(&mut sock, file_id, 0).await?;
                        }
                    }
                }

                Packet::ResumeRequest(req) => {
                    carry = self.handle_resume(&mut sock, req.file_id).await?;
                }

                Packet::ViewCloudRequest => {
                    let listing = {
                        let state = self.state.lock().unwrap();
                        let entries: Vec<RemoteFileEntry> = state
                            .completed
                            .iter()
                            .map(|(name, data)| RemoteFileEntry {
                                size: data.len() as u64,
                                is_dir: false,
                                path: name.clone(),
                                name: name.clone(),
                            })
                            .collect();
                        ViewCloudResponse {
                            total_size: entries.iter().map(|e| e.size).sum(),
                            entries,
                        }
                    };
                    self.reply(&mut sock, &Packet::ViewCloudResponse(listing))
                        .await?;
                }

                Packet::CreateDirRequest(req) => {
                    self.reply(
                        &mut sock,
                        &Packet::CreateDirResponse(zw::protocol::packet::CreateDirResponse {
                            created: true,
                            message: format!("created {}", req.dir_path),
                        }),
                    )
                    .await?;
                }

                Packet::CloseSession(_) => return Ok(()),

                other => panic!("peer received unexpected packet {other:?}"),
            }
        }
    }

    async fn reply(&self, sock: &mut TcpStream, packet: &Packet) -> Result<()> {
        frame::write_packet(sock, &self.cipher, &NIL_SESSION_ID, packet).await
    }

    /// Apply one incoming upload chunk, honoring nack injection.
    fn accept_chunk(&self, chunk: &FileChunk) -> FileChunkAck {
        let mut nack = self.nack.lock().unwrap();
        if let Some((index, remaining)) = *nack {
            if index == chunk.chunk_index && remaining > 0 {
                *nack = Some((index, remaining - 1));
                return FileChunkAck {
                    file_id: chunk.file_id,
                    chunk_index: chunk.chunk_index,
                    success: false,
                };
            }
        }
        drop(nack);

        let mut state = self.state.lock().unwrap();
        let Some(slot) = state.uploads.get_mut(&chunk.file_id) else {
            return FileChunkAck {
                file_id: chunk.file_id,
                chunk_index: chunk.chunk_index,
                success: false,
            };
        };

        let digest_ok = chunk.checksum == [0u8; DIGEST_LEN]
            || md5_bytes(&chunk.data) == chunk.checksum;
        if !digest_ok {
            return FileChunkAck {
                file_id: chunk.file_id,
                chunk_index: chunk.chunk_index,
                success: false,
            };
        }

        slot.data.extend_from_slice(&chunk.data);
        slot.chunks_received += 1;

        if slot.data.len() as u64 >= slot.size {
            let name = slot.name.clone();
            let data = slot.data.clone();
            state.completed.insert(name, data);
        }

        FileChunkAck {
            file_id: chunk.file_id,
            chunk_index: chunk.chunk_index,
            success: true,
        }
    }

    /// Answer a resume probe for either direction, then (for downloads)
    /// restart streaming. Returns a carried-over packet if a non-ack arrived
    /// mid-stream.
    async fn handle_resume(&self, sock: &mut TcpStream, file_id: u32) -> Result<Option<Packet>> {
        enum Kind {
            Upload { position: u64, remaining: u32 },
            Download { from_chunk: u32, position: u64, remaining: u32 },
            Unknown,
        }

        let kind = {
            let state = self.state.lock().unwrap();
            if let Some(slot) = state.uploads.get(&file_id) {
                let total = slot.size.div_ceil(slot.chunk_size as u64) as u32;
                Kind::Upload {
                    position: slot.data.len() as u64,
                    remaining: total - slot.chunks_received,
                }
            } else if let Some(slot) = state.downloads.get(&file_id) {
                let total = (slot.data.len() as u64).div_ceil(self.chunk_size as u64) as u32;
                Kind::Download {
                    from_chunk: slot.acked_chunks,
                    position: slot.acked_chunks as u64 * self.chunk_size as u64,
                    remaining: total - slot.acked_chunks,
                }
            } else {
                Kind::Unknown
            }
        };

        match kind {
            Kind::Unknown => {
                self.reply(
                    sock,
                    &Packet::ResumeResponse(ResumeResponse::NotFound {
                        message: "no transfer with that id".to_string(),
                    }),
                )
                .await?;
                Ok(None)
            }
            Kind::Upload { position, remaining } => {
                self.reply(
                    sock,
                    &Packet::ResumeResponse(ResumeResponse::Supported {
                        file_id,
                        resume_position: position,
                        remaining_chunks: remaining,
                    }),
                )
                .await?;
                Ok(None)
            }
            Kind::Download {
                from_chunk,
                position,
                remaining,
            } => {
                self.reply(
                    sock,
                    &Packet::ResumeResponse(ResumeResponse::Supported {
                        file_id,
                        resume_position: position,
                        remaining_chunks: remaining,
                    }),
                )
                .await?;
                self.stream_download(sock, file_id, from_chunk).await
            }
        }
    }

    /// Send chunks `from_chunk..` of a download, waiting for each ack and
    /// resending on negative ones. A non-ack packet ends the stream and is
    /// handed back to the dispatch loop.
    async fn stream_download(
        &self,
        sock: &mut TcpStream,
        file_id: u32,
        from_chunk: u32,
    ) -> Result<Option<Packet>> {
        let (data, chunk_size) = {
            let state = self.state.lock().unwrap();
            let slot = &state.downloads[&file_id];
            (slot.data.clone(), self.chunk_size as usize)
        };
        let total = data.len().div_ceil(chunk_size) as u32;

        let mut index = from_chunk;
        while index < total {
            let start = index as usize * chunk_size;
            let end = (start + chunk_size).min(data.len());
            let body = &data[start..end];

            let mut checksum = md5_bytes(body);
            {
                let mut corrupt = self.corrupt.lock().unwrap();
                if let Some((bad_index, remaining)) = *corrupt {
                    if bad_index == index && remaining > 0 {
                        *corrupt = Some((bad_index, remaining - 1));
                        checksum[0] ^= 0xFF;
                    }
                }
            }

            self.reply(
                sock,
                &Packet::FileChunk(FileChunk {
                    file_id,
                    chunk_index: index,
                    checksum,
                    data: bytes::Bytes::copy_from_slice(body),
                }),
            )
            .await?;

            let packet = match frame::read_packet(sock, &self.cipher, u32::MAX).await {
                Ok((_, p)) => p,
                Err(_) => return Ok(None),
            };

            match packet {
                Packet::FileChunkAck(ack) if ack.success => {
                    index += 1;
                    let mut state = self.state.lock().unwrap();
                    if let Some(slot) = state.downloads.get_mut(&file_id) {
                        slot.acked_chunks = index;
                    }
                }
                Packet::FileChunkAck(_) => {
                    // Negative ack: retransmit the same chunk.
                }
                other => return Ok(Some(other)),
            }
        }

        Ok(None)
    }
}
