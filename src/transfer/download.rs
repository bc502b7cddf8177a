//! Download state machine.
//!
//! Mirror image of the upload path: the server streams chunks, the client
//! verifies, acknowledges every chunk (positive or negative), appends to the
//! output file, and rewrites the download checkpoint. A negative ack asks the
//! server to retransmit; three strikes on one chunk aborts the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use crate::config::ClientConfig;
use crate::crypto::{md5_bytes, md5_file, DIGEST_LEN};
use crate::error::{Result, TransferError};
use crate::net::Session;
use crate::protocol::packet::{DownloadRequest, DownloadResponse, FileChunkAck, Packet, PacketType};
use crate::transfer::checkpoint::{CheckpointFile, DownloadCheckpoint};
use crate::transfer::progress::ProgressSink;

/// Pause before expecting a retransmission of a corrupt chunk.
const RETRANSMIT_WAIT: Duration = Duration::from_millis(500);

/// Fetch `file_name` from the server into `work_dir`. Returns the path the
/// file was written to, which carries a `_<ms>` suffix if the plain name was
/// taken.
pub async fn download_file(
    session: &mut Session,
    cfg: &ClientConfig,
    work_dir: &Path,
    file_name: &str,
    progress: &dyn ProgressSink,
) -> Result<PathBuf> {
    session
        .send(&Packet::DownloadRequest(DownloadRequest {
            file_name: file_name.to_string(),
        }))
        .await?;

    let Packet::DownloadResponse(resp) = session.recv_expect(PacketType::DownloadResponse).await?
    else {
        unreachable!("recv_expect returned the wrong kind");
    };

    let (file_id, file_size, file_md5) = match resp {
        DownloadResponse::Found {
            file_id,
            file_size,
            checksum,
            ..
        } => (file_id, file_size, checksum),
        DownloadResponse::NotFound { message } | DownloadResponse::AccessDenied { message } => {
            return Err(TransferError::rejected(0, message));
        }
    };

    tracing::info!(file = file_name, file_id, size = file_size, "download allowed");

    let ckp_path = DownloadCheckpoint::path_for(work_dir, file_name);
    let mut checkpoint = CheckpointFile::create(ckp_path).await?;

    let out_path = unique_output_path(work_dir, file_name);
    let mut out = File::create(&out_path).await?;

    run_receive_loop(
        session,
        cfg,
        &mut out,
        &mut checkpoint,
        ReceiveLoop {
            file_id,
            file_size,
            total_received: 0,
            file_name,
        },
        progress,
    )
    .await?;
    drop(out);

    if cfg.verify_checksums {
        let actual = md5_file(&out_path).await?;
        if actual != file_md5 {
            return Err(TransferError::IntegrityFailure(format!(
                "downloaded file {file_name} does not match the advertised digest"
            )));
        }
    }

    checkpoint.remove().await?;
    tracing::info!(file = file_name, "download complete");
    Ok(out_path)
}

/// Receive-side loop state shared by fresh downloads and resumed ones.
pub(crate) struct ReceiveLoop<'a> {
    pub file_id: u32,
    pub file_size: u64,
    /// Bytes already on disk (the resume position; 0 for a fresh download).
    pub total_received: u64,
    pub file_name: &'a str,
}

/// Receive chunks until the file is complete. The output file must already
/// be positioned at `total_received`.
pub(crate) async fn run_receive_loop(
    session: &mut Session,
    cfg: &ClientConfig,
    out: &mut File,
    checkpoint: &mut CheckpointFile,
    params: ReceiveLoop<'_>,
    progress: &dyn ProgressSink,
) -> Result<()> {
    let mut total_received = params.total_received;
    let mut retries: HashMap<u32, u32> = HashMap::new();

    while total_received < params.file_size {
        let Packet::FileChunk(chunk) = session.recv_expect(PacketType::FileChunk).await? else {
            unreachable!("recv_expect returned the wrong kind");
        };

        if chunk.file_id != params.file_id {
            return Err(TransferError::malformed(format!(
                "chunk for file {} arrived in a dialog for file {}",
                chunk.file_id, params.file_id
            )));
        }

        let checksum_valid = !cfg.verify_checksums
            || chunk.checksum == [0u8; DIGEST_LEN]
            || md5_bytes(&chunk.data) == chunk.checksum;

        // The ack always goes out, positive or negative; a negative one is
        // the retransmission request.
        session
            .send(&Packet::FileChunkAck(FileChunkAck {
                file_id: chunk.file_id,
                chunk_index: chunk.chunk_index,
                success: checksum_valid,
            }))
            .await?;

        if checksum_valid {
            out.write_all(&chunk.data).await?;
            out.flush().await?;
            total_received += chunk.data.len() as u64;

            checkpoint
                .write_download(&DownloadCheckpoint {
                    file_name: params.file_name.to_string(),
                    file_id: params.file_id,
                    received: total_received,
                    last_chunk_index: chunk.chunk_index,
                    file_size: params.file_size,
                })
                .await?;

            progress.update(
                params.file_name,
                (total_received as f32 / params.file_size as f32) * 100.0,
            );
        } else {
            let strikes = retries.entry(chunk.chunk_index).or_insert(0);
            *strikes += 1;
            tracing::warn!(
                chunk = chunk.chunk_index,
                strikes = *strikes,
                "chunk digest mismatch, awaiting retransmission"
            );

            if *strikes >= cfg.chunk_retries {
                return Err(TransferError::IntegrityFailure(format!(
                    "chunk {} failed verification {} times",
                    chunk.chunk_index, *strikes
                )));
            }
            sleep(RETRANSMIT_WAIT).await;
        }
    }

    Ok(())
}

/// `<work_dir>/<name>`, or `<stem>_<ms-since-epoch>.<ext>` when the plain
/// name already exists.
pub(crate) fn unique_output_path(work_dir: &Path, file_name: &str) -> PathBuf {
    let plain = work_dir.join(file_name);
    if !plain.exists() {
        return plain;
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    match name.extension() {
        Some(ext) => work_dir.join(format!("{stem}_{millis}.{}", ext.to_string_lossy())),
        None => work_dir.join(format!("{stem}_{millis}")),
    }
}

/// Open an existing partial download for appending.
pub(crate) async fn open_for_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().append(true).open(path).await?)
}
