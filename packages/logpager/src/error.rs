use std::time::Duration;

use axum::BoxError;

/// Errors raised by a file backend or while establishing one.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// The environment variable holding the remote password is unset.
    #[error("no SSH password found in ${var} for {user}@{host}")]
    MissingCredentials {
        var: String,
        user: String,
        host: String,
    },

    #[error("host key for {host} rejected: {reason}")]
    HostKey { host: String, reason: String },

    #[error("SSH authentication failed for {user}@{host}")]
    AuthFailed { user: String, host: String },

    #[error("backend task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("backend is closed")]
    Closed,
}

impl BackendError {
    /// Setup failures that happen on the remote side of the connection,
    /// as opposed to local filesystem problems.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            BackendError::Ssh(_)
                | BackendError::MissingCredentials { .. }
                | BackendError::HostKey { .. }
                | BackendError::AuthFailed { .. }
        )
    }
}

/// Errors decoding an inbound command frame.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("malformed command frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unknown command type {0:?}")]
    UnknownType(String),

    #[error("unknown mode {0:?}")]
    UnknownMode(String),

    #[error("expected a single key, got {0:?}")]
    InvalidKey(String),

    #[error("unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}

impl CommandError {
    /// Only a frame that cannot be decoded at all ends the session. Well-formed
    /// frames carrying something we do not understand are skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::Decode(_))
    }
}

/// Conditions that end a running session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("no client activity for {0:?}")]
    IdleTimeout(Duration),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
