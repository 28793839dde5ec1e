use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tracing::debug;

use super::{FileBackend, read_window_async};
use crate::error::BackendError;

/// A file on the local filesystem.
pub struct LocalBackend {
    file: Option<File>,
    /// Seek position as the caller last set it. `read_at` moves the OS file
    /// position and restores this afterwards.
    position: u64,
}

impl LocalBackend {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        debug!("Opened local file {}", path.display());
        Ok(Self {
            file: Some(file),
            position: 0,
        })
    }

    fn file(&mut self) -> Result<&mut File, BackendError> {
        self.file.as_mut().ok_or(BackendError::Closed)
    }
}

#[async_trait]
impl FileBackend for LocalBackend {
    async fn stat(&mut self) -> Result<u64, BackendError> {
        Ok(self.file()?.metadata().await?.len())
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, BackendError> {
        let position = self.file()?.seek(pos).await?;
        self.position = position;
        Ok(position)
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, BackendError> {
        let position = self.position;
        Ok(read_window_async(self.file()?, offset, len, position).await?)
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        match self.file.take() {
            Some(file) => {
                // tokio flushes pending operations before handing back the std file
                drop(file.into_std().await);
                Ok(())
            }
            None => Err(BackendError::Closed),
        }
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
