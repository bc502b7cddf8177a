//! High-level client facade.
//!
//! Owns one authenticated session and exposes the user-facing operations:
//! upload, download, resume, directory batches, remote listing. Checkpoints
//! and downloaded files land in the process working directory unless
//! [`Client::set_work_dir`] points somewhere else.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::batch::{upload_dir_parallel, upload_dir_sequential, BatchReport};
use crate::config::ClientConfig;
use crate::error::{Result, TransferError};
use crate::net::{Connection, Session};
use crate::protocol::packet::{
    CreateDirRequest, Packet, PacketType, ViewCloudResponse,
};
use crate::transfer::progress::ProgressSink;
use crate::transfer::{download_file, resume_download, resume_upload, upload_file};

pub struct Client {
    cfg: ClientConfig,
    session: Session,
    work_dir: PathBuf,
    welcome: String,
}

impl Client {
    /// Connect and perform the version handshake.
    pub async fn connect(cfg: ClientConfig) -> Result<Self> {
        let conn = Connection::connect(&cfg).await?;
        let mut session = Session::new(conn);
        let welcome = session.handshake().await?;

        Ok(Self {
            cfg,
            session,
            work_dir: PathBuf::from("."),
            welcome,
        })
    }

    /// The server's handshake banner.
    pub fn welcome(&self) -> &str {
        &self.welcome
    }

    /// Redirect checkpoints and downloads away from the process working
    /// directory.
    pub fn set_work_dir(&mut self, dir: impl Into<PathBuf>) {
        self.work_dir = dir.into();
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.session.authenticate(username, password).await
    }

    /// Notify the server and tear the session down.
    pub async fn logout(&mut self) -> Result<()> {
        self.session.close().await
    }

    /// Re-dial the server and replay handshake plus authentication.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.session.reconnect().await
    }

    fn require_auth(&self) -> Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(TransferError::IllegalState(
                "operation requires an authenticated session",
            ))
        }
    }

    /// Upload one file under its own name.
    pub async fn upload(
        &mut self,
        local: impl AsRef<Path>,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        self.require_auth()?;
        let local = local.as_ref();
        let remote_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::InvalidArgument(format!("{} has no file name", local.display()))
            })?;

        upload_file(
            &mut self.session,
            &self.cfg,
            &self.work_dir,
            local,
            &remote_name,
            progress,
            true,
        )
        .await
    }

    /// Download a remote file into the working directory. Returns where it
    /// was written.
    pub async fn download(
        &mut self,
        file_name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        self.require_auth()?;
        download_file(
            &mut self.session,
            &self.cfg,
            &self.work_dir,
            file_name,
            progress,
        )
        .await
    }

    /// Resume an interrupted upload from its checkpoint.
    pub async fn resume_upload(
        &mut self,
        local: impl AsRef<Path>,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        self.require_auth()?;
        let local = local.as_ref();
        let remote_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::InvalidArgument(format!("{} has no file name", local.display()))
            })?;

        resume_upload(
            &mut self.session,
            &self.cfg,
            &self.work_dir,
            local,
            &remote_name,
            progress,
        )
        .await
    }

    /// Resume an interrupted download from its checkpoint.
    pub async fn resume_download(
        &mut self,
        file_name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        self.require_auth()?;
        resume_download(
            &mut self.session,
            &self.cfg,
            &self.work_dir,
            file_name,
            progress,
        )
        .await
    }

    /// Upload a directory tree over this session, one file at a time.
    pub async fn upload_directory(
        &mut self,
        root: impl AsRef<Path>,
        progress: &dyn ProgressSink,
    ) -> Result<BatchReport> {
        self.require_auth()?;
        upload_dir_sequential(
            &mut self.session,
            &self.cfg,
            &self.work_dir,
            root.as_ref(),
            progress,
        )
        .await
    }

    /// Upload a directory tree with a pool of independently authenticated
    /// workers.
    pub async fn upload_directory_parallel(
        &mut self,
        root: impl AsRef<Path>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<BatchReport> {
        self.require_auth()?;
        let credentials = self
            .session
            .credentials()
            .cloned()
            .ok_or(TransferError::IllegalState(
                "parallel upload requires cached credentials",
            ))?;

        upload_dir_parallel(&self.cfg, credentials, &self.work_dir, root.as_ref(), progress).await
    }

    /// List the files stored remotely for this account.
    pub async fn list_remote(&mut self) -> Result<ViewCloudResponse> {
        self.require_auth()?;
        self.session.send(&Packet::ViewCloudRequest).await?;

        let Packet::ViewCloudResponse(listing) = self
            .session
            .recv_expect(PacketType::ViewCloudResponse)
            .await?
        else {
            unreachable!("recv_expect returned the wrong kind");
        };
        Ok(listing)
    }

    /// Create a directory in the remote storage tree. Returns the server's
    /// message.
    pub async fn create_remote_dir(&mut self, dir_path: &str) -> Result<String> {
        self.require_auth()?;
        self.session
            .send(&Packet::CreateDirRequest(CreateDirRequest {
                dir_path: dir_path.to_string(),
            }))
            .await?;

        let Packet::CreateDirResponse(resp) = self
            .session
            .recv_expect(PacketType::CreateDirResponse)
            .await?
        else {
            unreachable!("recv_expect returned the wrong kind");
        };

        if !resp.created {
            return Err(TransferError::rejected(0, resp.message));
        }
        Ok(resp.message)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}
