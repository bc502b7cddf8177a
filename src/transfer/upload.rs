//! Upload state machine.
//!
//! Request → response → chunk/ack dialog, strictly one packet in flight.
//! Each chunk is retried with exponential backoff; every acknowledged chunk
//! rewrites the on-disk checkpoint so a crash can resume where the server
//! left off.

use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::time::sleep;

use crate::config::ClientConfig;
use crate::crypto::{md5_bytes, md5_file_with_progress, DIGEST_LEN};
use crate::error::{Result, TransferError};
use crate::net::Session;
use crate::protocol::packet::{
    FileChunk, FileChunkAck, Packet, PacketType, UploadRequest, UploadResponse,
};
use crate::transfer::checkpoint::{CheckpointFile, UploadCheckpoint};
use crate::transfer::progress::ProgressSink;

/// Remote type tag sent with every single-file upload.
const FILE_TYPE: &str = "File";

/// Upload `local` to the server under `remote_name`.
///
/// `verbose` is false inside directory batches: per-file log chatter is
/// suppressed and the whole-file checksum is left to the server's per-chunk
/// acknowledgement loop (the request carries an explicitly absent checksum).
pub async fn upload_file(
    session: &mut Session,
    cfg: &ClientConfig,
    work_dir: &Path,
    local: &Path,
    remote_name: &str,
    progress: &dyn ProgressSink,
    verbose: bool,
) -> Result<()> {
    let file_size = tokio::fs::metadata(local).await?.len();

    if file_size == 0 {
        return upload_empty_file(session, cfg, remote_name).await;
    }

    let checksum = if cfg.verify_checksums && verbose {
        tracing::info!(file = %local.display(), size = file_size, "hashing before upload");
        Some(md5_file_with_progress(local, |_| {}).await?)
    } else {
        None
    };

    session
        .send(&Packet::UploadRequest(UploadRequest::new(
            remote_name,
            FILE_TYPE,
            file_size,
            checksum,
        )))
        .await?;

    let (file_id, chunk_size) = match expect_upload_response(session).await? {
        UploadResponse::Allowed {
            file_id,
            chunk_size,
        } => (file_id, chunk_size),
        UploadResponse::OutOfSpace { message } => {
            return Err(TransferError::rejected(0, message));
        }
    };
    if chunk_size == 0 {
        return Err(TransferError::malformed("server advertised zero chunk size"));
    }

    if verbose {
        tracing::info!(file_id, chunk_size, "upload allowed");
    }

    let chunk_size = chunk_size as u64;
    let chunk_count = file_size.div_ceil(chunk_size);

    let ckp_path = UploadCheckpoint::path_for(work_dir, local);
    let mut checkpoint = CheckpointFile::create(ckp_path).await?;

    let file = File::open(local).await?;
    let mut reader = BufReader::new(file);

    run_chunk_loop(
        session,
        cfg,
        &mut reader,
        &mut checkpoint,
        ChunkLoop {
            file_id,
            chunk_size,
            chunk_count,
            start_index: 0,
            file_size,
            total_sent: 0,
            display_name: remote_name,
        },
        progress,
    )
    .await?;

    checkpoint.remove().await?;
    if verbose {
        tracing::info!(file = remote_name, "upload complete");
    }
    Ok(())
}

/// Zero-length files take a short path: one empty chunk, one ack, no
/// checkpoint.
async fn upload_empty_file(
    session: &mut Session,
    cfg: &ClientConfig,
    remote_name: &str,
) -> Result<()> {
    let checksum = md5_bytes(b"");

    session
        .send(&Packet::UploadRequest(UploadRequest::new(
            remote_name,
            FILE_TYPE,
            0,
            Some(checksum),
        )))
        .await?;

    let file_id = match expect_upload_response(session).await? {
        UploadResponse::Allowed { file_id, .. } => file_id,
        UploadResponse::OutOfSpace { message } => {
            return Err(TransferError::rejected(0, message));
        }
    };

    send_chunk_with_retry(
        session,
        cfg,
        &FileChunk {
            file_id,
            chunk_index: 0,
            checksum,
            data: Bytes::new(),
        },
    )
    .await
}

async fn expect_upload_response(session: &mut Session) -> Result<UploadResponse> {
    let Packet::UploadResponse(resp) = session.recv_expect(PacketType::UploadResponse).await?
    else {
        unreachable!("recv_expect returned the wrong kind");
    };
    Ok(resp)
}

/// Everything the chunk loop needs besides the open reader.
pub(crate) struct ChunkLoop<'a> {
    pub file_id: u32,
    pub chunk_size: u64,
    pub chunk_count: u64,
    /// First chunk index to send (non-zero when resuming).
    pub start_index: u64,
    pub file_size: u64,
    /// Bytes the server already holds (the resume position).
    pub total_sent: u64,
    pub display_name: &'a str,
}

/// Drive chunks `start_index..chunk_count` through the send/ack dialog.
/// The reader must already be positioned at `total_sent`.
pub(crate) async fn run_chunk_loop(
    session: &mut Session,
    cfg: &ClientConfig,
    reader: &mut (impl AsyncRead + Unpin),
    checkpoint: &mut CheckpointFile,
    params: ChunkLoop<'_>,
    progress: &dyn ProgressSink,
) -> Result<()> {
    let mut total_sent = params.total_sent;

    for index in params.start_index..params.chunk_count {
        let current = params.chunk_size.min(params.file_size - total_sent) as usize;
        let mut data = vec![0u8; current];
        reader.read_exact(&mut data).await?;

        let checksum = if cfg.verify_checksums {
            md5_bytes(&data)
        } else {
            [0u8; DIGEST_LEN]
        };

        send_chunk_with_retry(
            session,
            cfg,
            &FileChunk {
                file_id: params.file_id,
                chunk_index: index as u32,
                checksum,
                data: Bytes::from(data),
            },
        )
        .await?;

        total_sent += current as u64;
        checkpoint
            .write_upload(&UploadCheckpoint {
                file_id: params.file_id,
                chunk_size: params.chunk_size,
                last_chunk_index: index,
            })
            .await?;

        progress.update(
            params.display_name,
            (total_sent as f32 / params.file_size as f32) * 100.0,
        );
    }

    Ok(())
}

/// Send one chunk and await its acknowledgement, retrying with exponential
/// backoff (`backoff_base · 2^attempt`). Exhausting the retries aborts the
/// file with the last failure.
async fn send_chunk_with_retry(
    session: &mut Session,
    cfg: &ClientConfig,
    chunk: &FileChunk,
) -> Result<()> {
    let mut attempt = 0u32;

    loop {
        match send_chunk_once(session, chunk).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < cfg.chunk_retries => {
                let delay = cfg.backoff_base * 2u32.pow(attempt);
                tracing::warn!(
                    chunk = chunk.chunk_index,
                    attempt = attempt + 1,
                    ?delay,
                    error = %e,
                    "chunk not acknowledged, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(chunk = chunk.chunk_index, "retries exhausted, aborting file");
                return Err(e);
            }
        }
    }
}

async fn send_chunk_once(session: &mut Session, chunk: &FileChunk) -> Result<()> {
    session.send(&Packet::FileChunk(chunk.clone())).await?;

    let Packet::FileChunkAck(ack) = session.recv_expect(PacketType::FileChunkAck).await? else {
        unreachable!("recv_expect returned the wrong kind");
    };

    validate_ack(&ack, chunk.file_id, chunk.chunk_index)
}

fn validate_ack(ack: &FileChunkAck, file_id: u32, chunk_index: u32) -> Result<()> {
    if !ack.success {
        return Err(TransferError::IntegrityFailure(format!(
            "server rejected chunk {chunk_index}"
        )));
    }
    if ack.file_id != file_id || ack.chunk_index != chunk_index {
        return Err(TransferError::IntegrityFailure(format!(
            "acknowledgement mismatch: got file {} chunk {}, expected file {file_id} chunk {chunk_index}",
            ack.file_id, ack.chunk_index
        )));
    }
    Ok(())
}
