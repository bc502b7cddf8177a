//! Per-frame authenticated encryption and content digests.
//!
//! Every frame on the wire is sealed with AES-128-GCM under a pre-shared key
//! and a fresh random 12-byte IV. File and chunk integrity uses MD5, which is
//! what the server stores and compares.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{Result, TransferError};

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;

/// GCM IV length in bytes.
pub const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// MD5 digest length in bytes.
pub const DIGEST_LEN: usize = 16;

/// Read granularity for file digests (4 MiB).
const DIGEST_BUF_LEN: usize = 4 * 1024 * 1024;

/// AES-128-GCM cipher bound to one pre-shared key.
///
/// IVs are drawn from the OS random source on every [`seal`](Self::seal) call
/// and must never be cached or replayed by callers; `(key, IV)` reuse breaks
/// GCM.
#[derive(Clone)]
pub struct FrameCipher {
    cipher: Aes128Gcm,
}

impl FrameCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key)),
        }
    }

    /// Encrypt `plaintext` under a fresh random IV.
    ///
    /// Returns `(iv, tag, ciphertext)`; the ciphertext has the same length as
    /// the plaintext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<([u8; IV_LEN], [u8; TAG_LEN], Vec<u8>)> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| TransferError::Io(std::io::Error::other("frame encryption failed")))?;

        let tag_start = sealed.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&sealed[tag_start..]);
        sealed.truncate(tag_start);

        Ok((iv, tag, sealed))
    }

    /// Decrypt one frame body. Fails closed: any tag mismatch is an
    /// [`TransferError::IntegrityFailure`].
    pub fn open(&self, iv: &[u8], tag: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(TransferError::malformed("bad IV or tag length"));
        }

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        self.cipher
            .decrypt(Nonce::from_slice(iv), sealed.as_slice())
            .map_err(|_| {
                TransferError::IntegrityFailure("frame authentication tag mismatch".to_string())
            })
    }
}

impl std::fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCipher").finish_non_exhaustive()
    }
}

/// MD5 of an in-memory buffer.
pub fn md5_bytes(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// MD5 of a whole file, read in 4 MiB slabs.
pub async fn md5_file(path: &Path) -> Result<[u8; DIGEST_LEN]> {
    md5_file_with_progress(path, |_| {}).await
}

/// MD5 of a whole file, invoking `progress` with cumulative bytes hashed
/// after every buffer. Read errors surface as [`TransferError::Io`]; the
/// digest never covers a short read silently.
pub async fn md5_file_with_progress(
    path: &Path,
    mut progress: impl FnMut(u64),
) -> Result<[u8; DIGEST_LEN]> {
    let mut file = File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; DIGEST_BUF_LEN];
    let mut hashed = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        hashed += n as u64;
        progress(hashed);
    }

    Ok(hasher.finalize().into())
}
