//! Transfer engine: upload, download, and resume state machines.
//!
//! Each operation is a strictly sequential request/response dialog over one
//! session — exactly one packet in flight. Chunk-level trouble is handled
//! here with bounded retries; anything that escapes aborts the current file.

pub mod checkpoint;
pub mod download;
pub mod progress;
pub mod resume;
pub mod upload;

pub use checkpoint::{DownloadCheckpoint, UploadCheckpoint, DOWNLOAD_CHECKPOINT_DIR};
pub use download::download_file;
pub use progress::{NullProgress, ProgressSink};
pub use resume::{resume_download, resume_upload};
pub use upload::upload_file;
