//! Push multiplexer
//!
//! The only owner of the offset cursor. It consumes mode, search and offset
//! events, talks to the backend, and pushes one text frame per result.

use std::io::SeekFrom;
use std::time::Duration;

use axum::BoxError;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use tracing::debug;

use super::command::{CommandReceivers, Mode, OffsetRequest};
use crate::backend::FileBackend;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::search::search_lines;

pub(crate) struct PushMultiplexer<'a, S> {
    backend: &'a mut dyn FileBackend,
    sink: &'a mut S,
    mode: Mode,
    /// Byte offset of the page the client is looking at. Always within
    /// `0..=file size` as of the last applied request.
    cursor: u64,
    page_size: usize,
    write_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl<'a, S> PushMultiplexer<'a, S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Into<BoxError>,
{
    pub fn new(backend: &'a mut dyn FileBackend, sink: &'a mut S, config: &SessionConfig) -> Self {
        Self {
            backend,
            sink,
            mode: Mode::Scroll,
            cursor: 0,
            page_size: config.page_size,
            write_timeout: config.write_timeout,
            idle_timeout: config.idle_timeout,
        }
    }

    /// Push the first page, then serve events until every channel closes or
    /// something fatal happens.
    pub async fn run(mut self, mut rx: CommandReceivers) -> Result<(), SessionError> {
        self.push_page(self.cursor).await?;

        loop {
            let idle = self.idle_timeout;
            tokio::select! {
                // A pending mode change applies before any queued value.
                biased;
                Some(mode) = rx.mode.recv() => {
                    debug!("Mode {} -> {}", self.mode, mode);
                    self.mode = mode;
                }
                Some(needle) = rx.search.recv() => self.handle_search(needle).await?,
                Some(request) = rx.offset.recv() => self.handle_offset(request).await?,
                _ = tokio::time::sleep(idle.unwrap_or_default()), if idle.is_some() => {
                    return Err(SessionError::IdleTimeout(idle.unwrap_or_default()));
                }
                else => {
                    debug!("Command channels closed");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_search(&mut self, needle: String) -> Result<(), SessionError> {
        if self.mode != Mode::Search {
            debug!("Discarding search value outside search mode");
            return Ok(());
        }

        let matches = search_lines(&mut *self.backend, &needle).await?;
        self.push(matches).await
    }

    async fn handle_offset(&mut self, request: OffsetRequest) -> Result<(), SessionError> {
        if self.mode != Mode::Scroll {
            debug!("Discarding {:?} outside scroll mode", request);
            return Ok(());
        }

        let size = self.backend.stat().await?;
        let Some(target) = self.resolve(request, size) else {
            return Ok(());
        };

        let position = self.backend.seek(SeekFrom::Start(target)).await?;
        self.cursor = position;
        debug!("Cursor at {} of {} bytes", position, size);
        self.push_page(position).await
    }

    /// Turn a request into the new cursor position, or `None` when it would
    /// leave the file.
    ///
    /// If the file shrinks below the cursor, relative moves that still land
    /// past the new end are rejected. `K` and `J` always land inside the
    /// file and bring the cursor back.
    fn resolve(&self, request: OffsetRequest, size: u64) -> Option<u64> {
        let cursor = self.cursor as i64;
        let delta = match request {
            OffsetRequest::By(delta) => delta,
            OffsetRequest::ToStart if self.cursor == 0 => {
                debug!("Already at beginning of file");
                return None;
            }
            OffsetRequest::ToStart => -cursor,
            OffsetRequest::ToEnd => size.saturating_sub(self.page_size as u64) as i64 - cursor,
        };

        if delta < 0 && self.cursor == 0 {
            debug!("Not seeking, already at beginning of file");
            return None;
        }
        let target = cursor.saturating_add(delta);
        if target > size as i64 {
            debug!("Not seeking, offset {} would pass end of file", target);
            return None;
        }

        Some(target.max(0) as u64)
    }

    async fn push_page(&mut self, offset: u64) -> Result<(), SessionError> {
        let page = self.backend.read_at(offset, self.page_size).await?;
        if page.is_empty() {
            debug!("Read 0 bytes at offset {}", offset);
            return Ok(());
        }
        debug!("Read {} bytes at offset {}", page.len(), offset);
        self.push(String::from_utf8_lossy(&page).into_owned()).await
    }

    /// Write one text frame under the write deadline.
    async fn push(&mut self, text: String) -> Result<(), SessionError> {
        match tokio::time::timeout(self.write_timeout, self.sink.send(Message::Text(text.into())))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Transport(e.into())),
            Err(_) => Err(SessionError::WriteTimeout(self.write_timeout)),
        }
    }
}
