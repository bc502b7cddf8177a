//! Sequential and parallel directory upload strategies.
//!
//! Sequential reuses the caller's session; parallel starts a bounded pool of
//! workers, each with its own connection and authenticated session, over a
//! contiguous partition of the size-sorted work list. Per-file failures are
//! collected, never fatal to the batch; the batch only aborts when its own
//! session setup fails.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::batch::plan::{partition, sort_for_parallel, sort_for_sequential};
use crate::batch::scanner::{scan, LocalFileEntry};
use crate::config::ClientConfig;
use crate::error::{Result, TransferError};
use crate::net::{Connection, Session};
use crate::protocol::packet::{Packet, PacketType, UploadDirRequest, UploadResponse};
use crate::transfer::progress::ProgressSink;
use crate::transfer::upload::upload_file;

/// One file the batch could not deliver.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Relative path of the file inside the batch.
    pub file: String,
    /// Human-readable cause, quoting the underlying error.
    pub reason: String,
}

/// Outcome of a directory upload.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub attempted: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    pub fn all_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

fn remote_name(entry: &LocalFileEntry) -> String {
    entry.relative_path.to_string_lossy().replace('\\', "/")
}

/// Upload every file under `root` over the existing session, smallest file
/// first. The batch is announced with a directory request before the
/// per-file dialogs start.
pub async fn upload_dir_sequential(
    session: &mut Session,
    cfg: &ClientConfig,
    work_dir: &Path,
    root: &Path,
    progress: &dyn ProgressSink,
) -> Result<BatchReport> {
    let mut entries = scan(root).await?;
    sort_for_sequential(&mut entries);

    announce_batch(session, cfg, root, &entries).await?;

    let mut report = BatchReport {
        attempted: entries.len(),
        ..Default::default()
    };

    for entry in &entries {
        let name = remote_name(entry);
        if let Err(e) =
            upload_file(session, cfg, work_dir, &entry.path, &name, progress, false).await
        {
            tracing::warn!(file = %name, error = %e, "batch file failed");
            report.failures.push(BatchFailure {
                file: name,
                reason: e.to_string(),
            });
        }
    }

    tracing::info!(
        attempted = report.attempted,
        failed = report.failures.len(),
        "sequential batch finished"
    );
    Ok(report)
}

async fn announce_batch(
    session: &mut Session,
    cfg: &ClientConfig,
    root: &Path,
    entries: &[LocalFileEntry],
) -> Result<()> {
    session
        .send(&Packet::UploadDirRequest(UploadDirRequest {
            file_count: entries.len() as u32,
            total_size: entries.iter().map(|e| e.size).sum(),
            verify_checksums: cfg.verify_checksums,
            dir_path: root.to_string_lossy().into_owned(),
        }))
        .await?;

    match session.recv_expect(PacketType::UploadResponse).await? {
        Packet::UploadResponse(UploadResponse::Allowed { .. }) => Ok(()),
        Packet::UploadResponse(UploadResponse::OutOfSpace { message }) => {
            Err(TransferError::rejected(0, message))
        }
        _ => unreachable!("recv_expect returned the wrong kind"),
    }
}

/// Upload every file under `root` across a pool of workers, largest file
/// first. Each worker opens its own connection, performs handshake and
/// authentication with the supplied credentials, uploads its partition
/// sequentially, and closes its session. All workers are awaited; failures
/// are aggregated, never short-circuited.
pub async fn upload_dir_parallel(
    cfg: &ClientConfig,
    credentials: (String, String),
    work_dir: &Path,
    root: &Path,
    progress: Arc<dyn ProgressSink>,
) -> Result<BatchReport> {
    let mut entries = scan(root).await?;
    sort_for_parallel(&mut entries);

    let attempted = entries.len();
    let parts = partition(entries, cfg.parallel_workers);
    let failures: Arc<Mutex<Vec<BatchFailure>>> = Arc::new(Mutex::new(Vec::new()));

    let mut workers = Vec::with_capacity(parts.len());
    for (worker_id, part) in parts.into_iter().enumerate() {
        let cfg = cfg.clone();
        let credentials = credentials.clone();
        let work_dir: PathBuf = work_dir.to_path_buf();
        let failures = Arc::clone(&failures);
        let progress = Arc::clone(&progress);

        workers.push(tokio::spawn(async move {
            run_worker(worker_id, cfg, credentials, work_dir, part, failures, progress).await;
        }));
    }

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "batch worker panicked");
        }
    }

    let failures = match Arc::try_unwrap(failures) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|p| p.into_inner()),
        Err(shared) => shared.lock().unwrap_or_else(|p| p.into_inner()).clone(),
    };

    let report = BatchReport {
        attempted,
        failures,
    };
    tracing::info!(
        attempted = report.attempted,
        failed = report.failures.len(),
        "parallel batch finished"
    );
    Ok(report)
}

async fn run_worker(
    worker_id: usize,
    cfg: ClientConfig,
    credentials: (String, String),
    work_dir: PathBuf,
    part: Vec<LocalFileEntry>,
    failures: Arc<Mutex<Vec<BatchFailure>>>,
    progress: Arc<dyn ProgressSink>,
) {
    let mut session = match open_worker_session(&cfg, &credentials).await {
        Ok(session) => session,
        Err(e) => {
            // The whole partition fails with the session error; the other
            // workers keep going.
            tracing::warn!(worker = worker_id, error = %e, "worker session setup failed");
            let mut guard = failures.lock().unwrap_or_else(|p| p.into_inner());
            for entry in &part {
                guard.push(BatchFailure {
                    file: remote_name(entry),
                    reason: format!("session setup failed: {e}"),
                });
            }
            return;
        }
    };

    for entry in &part {
        let name = remote_name(entry);
        if let Err(e) = upload_file(
            &mut session,
            &cfg,
            &work_dir,
            &entry.path,
            &name,
            progress.as_ref(),
            false,
        )
        .await
        {
            tracing::warn!(worker = worker_id, file = %name, error = %e, "batch file failed");
            failures
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(BatchFailure {
                    file: name,
                    reason: e.to_string(),
                });
        }
    }

    if let Err(e) = session.close().await {
        tracing::debug!(worker = worker_id, error = %e, "worker close failed");
    }
}

async fn open_worker_session(
    cfg: &ClientConfig,
    (username, password): &(String, String),
) -> Result<Session> {
    let conn = Connection::connect(cfg).await?;
    let mut session = Session::new(conn);
    session.handshake().await?;
    session.authenticate(username, password).await?;
    Ok(session)
}
