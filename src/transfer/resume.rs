//! Resuming interrupted transfers from persisted checkpoints.
//!
//! The client only proves it has something to resume; where to pick up is
//! the server's call. The request always carries position 0 and the server
//! answers with the authoritative resume position and remaining chunk count.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, BufReader, SeekFrom};

use crate::config::ClientConfig;
use crate::error::{Result, TransferError};
use crate::net::Session;
use crate::protocol::packet::{Packet, PacketType, ResumeRequest, ResumeResponse};
use crate::transfer::checkpoint::{CheckpointFile, DownloadCheckpoint, UploadCheckpoint};
use crate::transfer::download::{open_for_append, run_receive_loop, ReceiveLoop};
use crate::transfer::progress::ProgressSink;
use crate::transfer::upload::{run_chunk_loop, ChunkLoop};

async fn negotiate_resume(
    session: &mut Session,
    file_id: u32,
) -> Result<(u32, u64, u32)> {
    session
        .send(&Packet::ResumeRequest(ResumeRequest {
            file_id,
            resume_position: 0,
            last_chunk_index: 0,
        }))
        .await?;

    let Packet::ResumeResponse(resp) = session.recv_expect(PacketType::ResumeResponse).await?
    else {
        unreachable!("recv_expect returned the wrong kind");
    };

    match resp {
        ResumeResponse::Supported {
            file_id,
            resume_position,
            remaining_chunks,
        } => Ok((file_id, resume_position, remaining_chunks)),
        ResumeResponse::NotFound { message } => Err(TransferError::rejected(0, message)),
    }
}

/// Pick an interrupted upload of `local` back up from its checkpoint.
pub async fn resume_upload(
    session: &mut Session,
    cfg: &ClientConfig,
    work_dir: &Path,
    local: &Path,
    remote_name: &str,
    progress: &dyn ProgressSink,
) -> Result<()> {
    let ckp_path = UploadCheckpoint::path_for(work_dir, local);
    let stored = UploadCheckpoint::load(&ckp_path).await?;

    let (file_id, resume_position, remaining_chunks) =
        negotiate_resume(session, stored.file_id).await?;

    let file_size = tokio::fs::metadata(local).await?.len();
    let chunk_count = file_size.div_ceil(stored.chunk_size);
    let remaining = remaining_chunks as u64;
    if remaining > chunk_count {
        return Err(TransferError::malformed(format!(
            "server reports {remaining} chunks left of {chunk_count}"
        )));
    }

    tracing::info!(
        file = remote_name,
        file_id,
        resume_position,
        remaining,
        "resuming upload"
    );

    if remaining == 0 {
        // The server already holds the whole file.
        tokio::fs::remove_file(&ckp_path).await?;
        return Ok(());
    }

    let file = File::open(local).await?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(resume_position)).await?;

    let mut checkpoint = CheckpointFile::create(ckp_path).await?;
    // Keep the record on disk valid while the first resumed chunk is in
    // flight.
    checkpoint.write_upload(&stored).await?;

    run_chunk_loop(
        session,
        cfg,
        &mut reader,
        &mut checkpoint,
        ChunkLoop {
            file_id,
            chunk_size: stored.chunk_size,
            chunk_count,
            start_index: chunk_count - remaining,
            file_size,
            total_sent: resume_position,
            display_name: remote_name,
        },
        progress,
    )
    .await?;

    checkpoint.remove().await?;
    tracing::info!(file = remote_name, "resumed upload complete");
    Ok(())
}

/// Pick an interrupted download of `file_name` back up, appending to the
/// partial output file. Returns the output path.
///
/// The advertised whole-file digest is not persisted in the checkpoint, so a
/// resumed download ends without the final whole-file verification; every
/// chunk is still verified individually.
pub async fn resume_download(
    session: &mut Session,
    cfg: &ClientConfig,
    work_dir: &Path,
    file_name: &str,
    progress: &dyn ProgressSink,
) -> Result<PathBuf> {
    let ckp_path = DownloadCheckpoint::path_for(work_dir, file_name);
    let stored = DownloadCheckpoint::load(&ckp_path).await?;

    let (file_id, resume_position, remaining_chunks) =
        negotiate_resume(session, stored.file_id).await?;

    tracing::info!(
        file = file_name,
        file_id,
        resume_position,
        remaining = remaining_chunks,
        "resuming download"
    );

    let out_path = work_dir.join(&stored.file_name);
    let mut out = open_for_append(&out_path).await?;

    let mut checkpoint = CheckpointFile::create(ckp_path).await?;
    checkpoint.write_download(&stored).await?;

    run_receive_loop(
        session,
        cfg,
        &mut out,
        &mut checkpoint,
        ReceiveLoop {
            file_id,
            file_size: stored.file_size,
            total_received: resume_position,
            file_name,
        },
        progress,
    )
    .await?;
    drop(out);

    checkpoint.remove().await?;
    tracing::info!(file = file_name, "resumed download complete");
    Ok(out_path)
}
