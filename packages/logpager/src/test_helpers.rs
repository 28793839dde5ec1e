use std::io::SeekFrom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::FileBackend;
use crate::error::BackendError;

/// In-memory backend for session and search tests.
///
/// The content is shared so a test can grow the "file" while a session is
/// running, and `close_count` records how often the release path ran.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub content: Arc<Mutex<Vec<u8>>>,
    pub close_count: Arc<AtomicUsize>,
    /// When set, every read fails with this I/O error kind.
    pub fail_reads: Arc<Mutex<Option<std::io::ErrorKind>>>,
    position: u64,
    closed: bool,
}

impl MemoryBackend {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: Arc::new(Mutex::new(content.into())),
            ..Default::default()
        }
    }

    pub fn append(&self, data: &[u8]) {
        self.content.lock().unwrap().extend_from_slice(data);
    }

    pub fn closes(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), BackendError> {
        if self.closed {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FileBackend for MemoryBackend {
    async fn stat(&mut self) -> Result<u64, BackendError> {
        self.check_open()?;
        Ok(self.content.lock().unwrap().len() as u64)
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, BackendError> {
        self.check_open()?;
        let len = self.content.lock().unwrap().len() as i64;
        let next = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(d) => self.position as i64 + d,
            SeekFrom::End(d) => len + d,
        };
        if next < 0 {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of file",
            )));
        }
        self.position = next as u64;
        Ok(self.position)
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, BackendError> {
        self.check_open()?;
        if let Some(kind) = *self.fail_reads.lock().unwrap() {
            return Err(BackendError::Io(std::io::Error::new(kind, "injected read failure")));
        }
        let content = self.content.lock().unwrap();
        let start = (offset as usize).min(content.len());
        let end = start.saturating_add(len).min(content.len());
        Ok(content[start..end].to_vec())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.check_open()?;
        self.closed = true;
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// App state serving `target` with small pages and no SSH password available.
pub fn test_app_state(target: crate::backend::Target) -> crate::AppState {
    let session = crate::config::SessionConfig {
        page_size: 16,
        ..Default::default()
    };
    let ssh = crate::config::SshConfig {
        password_env: "LOGPAGER_TEST_UNSET_PASSWORD".to_string(),
        ..Default::default()
    };
    crate::AppState::new(target, session, ssh)
}
