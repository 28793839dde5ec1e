use std::io::{Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ssh2::Sftp;
use tracing::debug;

use super::{FileBackend, read_window};
use crate::error::BackendError;

/// A file read through an authenticated SFTP session.
///
/// libssh2 is blocking, so every call hops onto the blocking pool with a
/// shared handle to the file.
pub struct RemoteBackend {
    file: Option<SharedFile>,
    // Keeps the SFTP channel alive for as long as the file is open
    _sftp: Sftp,
    position: u64,
}

impl RemoteBackend {
    pub async fn open(sftp: Sftp, path: PathBuf) -> Result<Self, BackendError> {
        let (sftp, file, path) = tokio::task::spawn_blocking(move || {
            let file = sftp.open(&path)?;
            Ok::<_, BackendError>((sftp, file, path))
        })
        .await??;
        debug!("Opened remote file {}", path.display());
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
            _sftp: sftp,
            position: 0,
        })
    }

    fn handle(&self) -> Result<SharedFile, BackendError> {
        self.file.clone().ok_or(BackendError::Closed)
    }
}

type SharedFile = Arc<Mutex<ssh2::File>>;

/// Run a blocking operation against the file on the blocking pool.
async fn with_file<T, F>(file: SharedFile, op: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce(&mut ssh2::File) -> Result<T, BackendError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = file
            .lock()
            .map_err(|_| BackendError::Io(std::io::Error::other("remote file lock poisoned")))?;
        op(&mut guard)
    })
    .await?
}

#[async_trait]
impl FileBackend for RemoteBackend {
    async fn stat(&mut self) -> Result<u64, BackendError> {
        with_file(self.handle()?, |file| Ok(file.stat()?.size.unwrap_or(0))).await
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, BackendError> {
        let position = with_file(self.handle()?, move |file| Ok(file.seek(pos)?)).await?;
        self.position = position;
        Ok(position)
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, BackendError> {
        let position = self.position;
        with_file(self.handle()?, move |file| {
            Ok(read_window(file, offset, len, position)?)
        })
        .await
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        let file = self.file.take().ok_or(BackendError::Closed)?;
        with_file(file, |file| Ok(file.close()?)).await
    }

    fn kind(&self) -> &'static str {
        "remote"
    }
}
