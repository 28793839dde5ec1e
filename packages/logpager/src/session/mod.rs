//! One paging session per WebSocket connection.
//!
//! A session races two halves against each other: the [`command`] reader,
//! which turns inbound frames into typed events, and the push multiplexer,
//! which owns the cursor and writes pages and search results back. Whichever
//! half finishes first ends the session, and the backend plus the transport
//! are released exactly once afterwards.

pub mod command;
mod id;
mod multiplexer;

use axum::BoxError;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{Instrument, debug, info, info_span, warn};

pub use command::{Command, CommandFrame, Mode, OffsetRequest};
pub use id::{SessionId, sessions_started};

use crate::backend::{FileBackend, Target};
use crate::config::{SessionConfig, SshConfig};
use crate::error::{BackendError, SessionError};
use command::{CommandReader, command_channels};
use multiplexer::PushMultiplexer;

pub struct Session {
    id: SessionId,
    target: String,
    backend: Box<dyn FileBackend>,
    config: SessionConfig,
}

impl Session {
    /// Open the target file and allocate a session id. Fails before any
    /// WebSocket upgrade so the client gets a plain HTTP error instead.
    pub async fn open(
        target: &Target,
        ssh: &SshConfig,
        config: SessionConfig,
    ) -> Result<Self, BackendError> {
        let backend = target.open(ssh).await?;
        Ok(Self::new(target.to_string(), backend, config))
    }

    pub fn new(target: impl Into<String>, backend: Box<dyn FileBackend>, config: SessionConfig) -> Self {
        Self {
            id: SessionId::next(),
            target: target.into(),
            backend,
            config,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Serve an upgraded socket until either side ends the session.
    pub async fn serve(self, socket: WebSocket) {
        let id = self.id;
        let (sink, stream) = socket.split();
        if let Err(e) = self.run(sink, stream).await {
            warn!(session = %id, "Session ended with error: {}", e);
        }
    }

    /// Drive the session over any message transport.
    ///
    /// Returns the error that ended the session, if any. Teardown has already
    /// run when this returns.
    pub async fn run<S, R>(mut self, mut sink: S, stream: R) -> Result<(), SessionError>
    where
        S: Sink<Message> + Unpin + Send,
        S::Error: Into<BoxError>,
        R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    {
        let span = info_span!("session", id = %self.id);
        async move {
            info!(file = %self.target, backend = self.backend.kind(), "Session started");

            let (tx, rx) = command_channels();
            let outcome = {
                let reader = CommandReader::new(stream, tx, self.config.page_size).run();
                let pusher = PushMultiplexer::new(self.backend.as_mut(), &mut sink, &self.config).run(rx);

                tokio::select! {
                    result = reader => {
                        debug!("Command reader ended");
                        result
                    }
                    result = pusher => {
                        debug!("Push multiplexer ended");
                        result
                    }
                }
            };

            self.teardown(sink).await;
            outcome
        }
        .instrument(span)
        .await
    }

    /// Release the file and close the transport. Takes `self`, so it cannot
    /// run twice.
    async fn teardown<S>(mut self, mut sink: S)
    where
        S: Sink<Message> + Unpin,
        S::Error: Into<BoxError>,
    {
        if let Err(e) = self.backend.close().await {
            warn!("Failed to close {} file: {}", self.backend.kind(), e);
        }

        match tokio::time::timeout(self.config.write_timeout, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let e: BoxError = e.into();
                debug!("Transport already closed: {}", e);
            }
            Err(_) => debug!("Timed out closing transport"),
        }

        info!("Session closed");
    }
}
