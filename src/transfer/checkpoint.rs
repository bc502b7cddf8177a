//! On-disk checkpoints for interrupted transfers.
//!
//! One small binary record per file, rewritten in place after every
//! acknowledged chunk: truncate to zero, write from offset 0, flush. The file
//! is deleted once the whole transfer succeeds and survives process crashes
//! otherwise.
//!
//! Upload checkpoints live next to the working directory as `<stem>.ckp`;
//! download checkpoints live under `checkpoint/<stem>.ckp`.

use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::error::{Result, TransferError};

/// Directory (under the working directory) holding download checkpoints.
pub const DOWNLOAD_CHECKPOINT_DIR: &str = "checkpoint";

const CHECKPOINT_EXT: &str = "ckp";

fn stem_of(name: &Path) -> String {
    name.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transfer".to_string())
}

// =============================================================================
// Upload checkpoint
// =============================================================================

/// Progress record for an outgoing file: `(file_id, chunk_size,
/// last_chunk_index)`, all little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCheckpoint {
    pub file_id: u32,
    pub chunk_size: u64,
    pub last_chunk_index: u64,
}

impl UploadCheckpoint {
    const ENCODED_LEN: usize = 4 + 8 + 8;

    /// `<work_dir>/<stem>.ckp` for the local file being uploaded.
    pub fn path_for(work_dir: &Path, local: &Path) -> PathBuf {
        work_dir.join(format!("{}.{CHECKPOINT_EXT}", stem_of(local)))
    }

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        buf.put_u32_le(self.file_id);
        buf.put_u64_le(self.chunk_size);
        buf.put_u64_le(self.last_chunk_index);
        buf
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::ENCODED_LEN {
            return None;
        }
        let mut buf = Bytes::copy_from_slice(bytes);
        Some(Self {
            file_id: buf.get_u32_le(),
            chunk_size: buf.get_u64_le(),
            last_chunk_index: buf.get_u64_le(),
        })
    }

    /// Read a checkpoint back. A missing, empty, or truncated file means
    /// there is nothing to resume from.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::NoResumableState(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        Self::decode(&bytes).ok_or_else(|| {
            tracing::warn!(path = %path.display(), "checkpoint unreadable, ignoring");
            TransferError::NoResumableState(path.to_path_buf())
        })
    }
}

// =============================================================================
// Download checkpoint
// =============================================================================

/// Progress record for an incoming file: `(name_len, name, file_id,
/// bytes_received, last_chunk_index, file_size)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCheckpoint {
    pub file_name: String,
    pub file_id: u32,
    pub received: u64,
    pub last_chunk_index: u32,
    pub file_size: u64,
}

impl DownloadCheckpoint {
    /// `<work_dir>/checkpoint/<stem>.ckp` for the named remote file.
    pub fn path_for(work_dir: &Path, file_name: &str) -> PathBuf {
        work_dir
            .join(DOWNLOAD_CHECKPOINT_DIR)
            .join(format!("{}.{CHECKPOINT_EXT}", stem_of(Path::new(file_name))))
    }

    fn encode(&self) -> BytesMut {
        let name = self.file_name.as_bytes();
        let mut buf = BytesMut::with_capacity(8 + name.len() + 4 + 8 + 4 + 8);
        buf.put_u64_le(name.len() as u64);
        buf.put_slice(name);
        buf.put_u32_le(self.file_id);
        buf.put_u64_le(self.received);
        buf.put_u32_le(self.last_chunk_index);
        buf.put_u64_le(self.file_size);
        buf
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let mut buf = Bytes::copy_from_slice(bytes);
        if buf.remaining() < 8 {
            return None;
        }
        let name_len = buf.get_u64_le() as usize;
        if buf.remaining() < name_len + 4 + 8 + 4 + 8 {
            return None;
        }
        let file_name = String::from_utf8(buf.copy_to_bytes(name_len).to_vec()).ok()?;

        Some(Self {
            file_name,
            file_id: buf.get_u32_le(),
            received: buf.get_u64_le(),
            last_chunk_index: buf.get_u32_le(),
            file_size: buf.get_u64_le(),
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::NoResumableState(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        Self::decode(&bytes).ok_or_else(|| {
            tracing::warn!(path = %path.display(), "checkpoint unreadable, ignoring");
            TransferError::NoResumableState(path.to_path_buf())
        })
    }
}

// =============================================================================
// Live checkpoint handle
// =============================================================================

/// An open checkpoint file, rewritten after each acknowledged chunk.
pub struct CheckpointFile {
    file: File,
    path: PathBuf,
}

impl CheckpointFile {
    /// Open (or truncate) the checkpoint at `path`, creating parent
    /// directories as needed.
    pub async fn create(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_upload(&mut self, record: &UploadCheckpoint) -> Result<()> {
        self.rewrite(&record.encode()).await
    }

    pub async fn write_download(&mut self, record: &DownloadCheckpoint) -> Result<()> {
        self.rewrite(&record.encode()).await
    }

    async fn rewrite(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.set_len(0).await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// Delete the checkpoint after a completed transfer.
    pub async fn remove(self) -> Result<()> {
        let path = self.path;
        drop(self.file);
        fs::remove_file(&path).await?;
        Ok(())
    }
}
