//! File backends
//!
//! A backend is the only thing a session knows about the file it is paging
//! through. Local files and files behind an SFTP session implement the same
//! trait so the session never branches on where the bytes come from.

mod local;
mod remote;
pub mod ssh;

pub use local::LocalBackend;
pub use remote::RemoteBackend;
pub use ssh::SshTarget;

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::config::SshConfig;
use crate::error::BackendError;

/// Read/seek/stat capability over an open file.
#[async_trait]
pub trait FileBackend: Send {
    /// Current size of the file in bytes.
    async fn stat(&mut self) -> Result<u64, BackendError>;

    /// Move the seek position and return the new absolute position.
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, BackendError>;

    /// Read up to `len` bytes starting at `offset` without moving the seek
    /// position. Returns fewer bytes at the end of the file and an empty
    /// buffer at or past it.
    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, BackendError>;

    /// Release the underlying handle. Further calls fail with
    /// [`BackendError::Closed`].
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Short label used in logs.
    fn kind(&self) -> &'static str;
}

/// Read up to `len` bytes at `offset`, then seek back to `restore`.
///
/// Short reads are retried until the buffer is full or the file ends.
pub(crate) fn read_window<F: Read + Seek>(
    file: &mut F,
    offset: u64,
    len: usize,
    restore: u64,
) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    buf.truncate(filled);
    file.seek(SeekFrom::Start(restore))?;
    Ok(buf)
}

/// Async counterpart of [`read_window`].
pub(crate) async fn read_window_async<F: AsyncRead + AsyncSeek + Unpin>(
    file: &mut F,
    offset: u64,
    len: usize,
    restore: u64,
) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    buf.truncate(filled);
    file.seek(SeekFrom::Start(restore)).await?;
    Ok(buf)
}

/// The file a server instance serves, either on this machine or over SFTP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Local(PathBuf),
    Remote { ssh: SshTarget, path: PathBuf },
}

impl Target {
    /// Open a fresh backend handle for one session.
    pub async fn open(&self, ssh_config: &SshConfig) -> Result<Box<dyn FileBackend>, BackendError> {
        match self {
            Target::Local(path) => Ok(Box::new(LocalBackend::open(path).await?)),
            Target::Remote { ssh, path } => {
                let sftp = ssh::connect(ssh.clone(), ssh_config.clone()).await?;
                Ok(Box::new(RemoteBackend::open(sftp, path.clone()).await?))
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local(path) => write!(f, "{}", path.display()),
            Target::Remote { ssh, path } => write!(f, "{}:{}", ssh, path.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid target {input:?}: {reason}")]
pub struct ParseTargetError {
    input: String,
    reason: &'static str,
}

impl FromStr for Target {
    type Err = ParseTargetError;

    /// Accepts `path`, `user@host:path` or `user@host:port:path`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseTargetError {
            input: s.to_string(),
            reason,
        };

        if s.is_empty() {
            return Err(err("empty target"));
        }

        let Some((user, rest)) = s.split_once('@') else {
            return Ok(Target::Local(PathBuf::from(s)));
        };
        // An '@' inside a local path (e.g. "logs/app@2.log") is not a remote target
        if user.contains('/') {
            return Ok(Target::Local(PathBuf::from(s)));
        }
        let Some((host, rest)) = rest.split_once(':') else {
            return Err(err("expected user@host:path"));
        };
        if user.is_empty() || host.is_empty() {
            return Err(err("user and host must not be empty"));
        }

        let (port, path) = match rest.split_once(':') {
            Some((port, path)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
                let port = port.parse::<u16>().map_err(|_| err("port out of range"))?;
                (Some(port), path)
            }
            _ => (None, rest),
        };
        if path.is_empty() {
            return Err(err("missing remote path"));
        }

        Ok(Target::Remote {
            ssh: SshTarget {
                user: user.to_string(),
                host: host.to_string(),
                port,
            },
            path: PathBuf::from(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_path() {
        let target: Target = "/var/log/syslog".parse().unwrap();
        assert_eq!(target, Target::Local(PathBuf::from("/var/log/syslog")));
    }

    #[test]
    fn at_sign_in_local_path_stays_local() {
        let target: Target = "logs/app@2.log".parse().unwrap();
        assert_eq!(target, Target::Local(PathBuf::from("logs/app@2.log")));
    }

    #[test]
    fn parses_remote_target() {
        let target: Target = "admin@example.com:/var/log/app.log".parse().unwrap();
        assert_eq!(
            target,
            Target::Remote {
                ssh: SshTarget {
                    user: "admin".into(),
                    host: "example.com".into(),
                    port: None,
                },
                path: PathBuf::from("/var/log/app.log"),
            }
        );
        assert_eq!(target.to_string(), "admin@example.com:/var/log/app.log");
    }

    #[test]
    fn parses_remote_target_with_port() {
        let target: Target = "admin@example.com:2222:logs/app.log".parse().unwrap();
        match target {
            Target::Remote { ssh, path } => {
                assert_eq!(ssh.port, Some(2222));
                assert_eq!(path, PathBuf::from("logs/app.log"));
            }
            other => panic!("expected remote target, got {other:?}"),
        }
    }

    #[test]
    fn rejects_incomplete_remote_targets() {
        assert!("admin@example.com".parse::<Target>().is_err());
        assert!("admin@example.com:".parse::<Target>().is_err());
        assert!("@example.com:/log".parse::<Target>().is_err());
        assert!("admin@example.com:99999:/log".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
    }

    /// Hands out at most `chunk` bytes per read, like a pipe or an SFTP channel.
    struct Trickle {
        inner: std::io::Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.chunk);
            Read::read(&mut self.inner, &mut buf[..n])
        }
    }

    impl Seek for Trickle {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            Seek::seek(&mut self.inner, pos)
        }
    }

    #[test]
    fn read_window_fills_across_short_reads() {
        let mut file = Trickle {
            inner: std::io::Cursor::new(b"0123456789".to_vec()),
            chunk: 3,
        };
        assert_eq!(read_window(&mut file, 1, 8, 0).unwrap(), b"12345678");
    }

    #[test]
    fn read_window_restores_position() {
        let mut file = std::io::Cursor::new(b"0123456789".to_vec());
        file.set_position(4);
        assert_eq!(read_window(&mut file, 0, 3, 4).unwrap(), b"012");
        assert_eq!(file.position(), 4);
    }

    #[test]
    fn read_window_tail_is_short_and_past_end_is_empty() {
        let mut file = std::io::Cursor::new(b"0123456789".to_vec());
        assert_eq!(read_window(&mut file, 7, 8, 0).unwrap(), b"789");
        assert!(read_window(&mut file, 10, 8, 0).unwrap().is_empty());
        assert!(read_window(&mut file, 50, 8, 2).unwrap().is_empty());
        assert_eq!(file.position(), 2);
    }

    #[tokio::test]
    async fn read_window_async_matches_blocking_version() {
        let mut file = std::io::Cursor::new(b"0123456789".to_vec());
        file.set_position(6);
        assert_eq!(read_window_async(&mut file, 2, 4, 6).await.unwrap(), b"2345");
        assert_eq!(file.position(), 6);
        assert_eq!(read_window_async(&mut file, 8, 4, 6).await.unwrap(), b"89");
        assert!(read_window_async(&mut file, 12, 4, 6).await.unwrap().is_empty());
    }
}
