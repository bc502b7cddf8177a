//! Directory scan producing the batch work list.
//!
//! Paths are recorded relative to the *parent* of the chosen root, so the
//! uploaded tree keeps one level of containing-folder name. Entries the
//! process may not read, and anything that is not a regular file, are
//! skipped.

use std::path::{Path, PathBuf};

use crate::error::{Result, TransferError};

/// One file slated for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileEntry {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the root's parent directory.
    pub relative_path: PathBuf,
    /// Bare file name.
    pub name: String,
    pub size: u64,
}

/// Recursively enumerate regular files under `root`.
///
/// Blocking; use [`scan`] from async contexts. Fails with `EmptyDirectory`
/// when nothing uploadable is found.
pub fn scan_dir(root: &Path) -> Result<Vec<LocalFileEntry>> {
    let meta = std::fs::metadata(root)
        .map_err(|_| TransferError::InvalidArgument(format!("{} is not readable", root.display())))?;
    if !meta.is_dir() {
        return Err(TransferError::InvalidArgument(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let base = root.parent().unwrap_or(root).to_path_buf();
    let mut entries = Vec::new();
    walk(root, &base, &mut entries);

    if entries.is_empty() {
        return Err(TransferError::EmptyDirectory(root.to_path_buf()));
    }
    Ok(entries)
}

fn walk(dir: &Path, base: &Path, out: &mut Vec<LocalFileEntry>) {
    let iter = match std::fs::read_dir(dir) {
        Ok(iter) => iter,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    for entry in iter.flatten() {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            walk(&path, base, out);
        } else if file_type.is_file() {
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(_) => continue,
            };

            let relative_path = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .to_path_buf();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            out.push(LocalFileEntry {
                path,
                relative_path,
                name,
                size,
            });
        }
        // Symlinks and other non-regular entries are skipped.
    }
}

/// Async wrapper running the scan on the blocking pool.
pub async fn scan(root: &Path) -> Result<Vec<LocalFileEntry>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || scan_dir(&root))
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
}
