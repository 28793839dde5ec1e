//! Client commands and the reader loop that feeds them to the multiplexer.
//!
//! ```text
//! {"type": "KEY",        "message": "j" | "k" | "J" | "K"}
//! {"type": "MODE_CTL",   "message": "SEARCH" | "SCROLL"}
//! {"type": "SEARCH_VAL", "message": "<text>"}
//! {"type": "CLOSE"}
//! ```

use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CommandError, SessionError};

/// Which kind of command the multiplexer currently acts on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Scroll,
    Search,
}

impl FromStr for Mode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCROLL" => Ok(Mode::Scroll),
            "SEARCH" => Ok(Mode::Search),
            other => Err(CommandError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Scroll => "SCROLL",
            Mode::Search => "SEARCH",
        })
    }
}

/// Raw inbound frame as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// A decoded client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Key(char),
    ModeControl(Mode),
    SearchValue(String),
    Close,
}

impl TryFrom<CommandFrame> for Command {
    type Error = CommandError;

    fn try_from(frame: CommandFrame) -> Result<Self, Self::Error> {
        match frame.kind.as_str() {
            "KEY" => {
                let mut chars = frame.message.chars();
                match (chars.next(), chars.next()) {
                    (Some(key), None) => Ok(Command::Key(key)),
                    _ => Err(CommandError::InvalidKey(frame.message)),
                }
            }
            "MODE_CTL" => Ok(Command::ModeControl(frame.message.parse()?)),
            "SEARCH_VAL" => Ok(Command::SearchValue(frame.message)),
            "CLOSE" => Ok(Command::Close),
            _ => Err(CommandError::UnknownType(frame.kind)),
        }
    }
}

impl Command {
    /// Decode a JSON command frame.
    pub fn decode(text: &str) -> Result<Self, CommandError> {
        let frame: CommandFrame = serde_json::from_str(text)?;
        Self::try_from(frame)
    }

    /// Decode a WebSocket message. Control frames that carry no command
    /// yield `Ok(None)`.
    pub fn from_message(message: Message) -> Result<Option<Self>, CommandError> {
        match message {
            Message::Text(text) => Self::decode(&text).map(Some),
            Message::Close(_) => Ok(Some(Command::Close)),
            Message::Binary(_) => Err(CommandError::UnsupportedFrame("binary")),
            Message::Ping(_) | Message::Pong(_) => Ok(None),
        }
    }
}

/// A request to move the offset cursor. Jumps are symbolic because only the
/// multiplexer knows the cursor and the file size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetRequest {
    By(i64),
    ToStart,
    ToEnd,
}

impl OffsetRequest {
    /// `j`/`k` page forward/back, `J` jumps to the last page, `K` to the top.
    pub fn for_key(key: char, page_size: usize) -> Option<Self> {
        let page = page_size as i64;
        match key {
            'j' => Some(OffsetRequest::By(page)),
            'k' => Some(OffsetRequest::By(-page)),
            'J' => Some(OffsetRequest::ToEnd),
            'K' => Some(OffsetRequest::ToStart),
            _ => None,
        }
    }
}

/// Sending halves of the session's three command channels.
pub(crate) struct CommandSenders {
    pub mode: mpsc::Sender<Mode>,
    pub search: mpsc::Sender<String>,
    pub offset: mpsc::Sender<OffsetRequest>,
}

/// Receiving halves, owned by the multiplexer.
pub(crate) struct CommandReceivers {
    pub mode: mpsc::Receiver<Mode>,
    pub search: mpsc::Receiver<String>,
    pub offset: mpsc::Receiver<OffsetRequest>,
}

/// Create the channel set. Capacity one keeps the reader at most one command
/// ahead of the multiplexer on each channel.
pub(crate) fn command_channels() -> (CommandSenders, CommandReceivers) {
    let (mode_tx, mode_rx) = mpsc::channel(1);
    let (search_tx, search_rx) = mpsc::channel(1);
    let (offset_tx, offset_rx) = mpsc::channel(1);
    (
        CommandSenders {
            mode: mode_tx,
            search: search_tx,
            offset: offset_tx,
        },
        CommandReceivers {
            mode: mode_rx,
            search: search_rx,
            offset: offset_rx,
        },
    )
}

/// Reads frames off the transport and forwards them as typed commands.
pub(crate) struct CommandReader<R> {
    stream: R,
    tx: CommandSenders,
    page_size: usize,
}

impl<R> CommandReader<R>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    pub fn new(stream: R, tx: CommandSenders, page_size: usize) -> Self {
        Self {
            stream,
            tx,
            page_size,
        }
    }

    /// Run until the client closes, the stream ends, or a fatal error.
    pub async fn run(mut self) -> Result<(), SessionError> {
        while let Some(frame) = self.stream.next().await {
            let frame = frame.map_err(|e| SessionError::Transport(e.into()))?;

            let command = match Command::from_message(frame) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping client command: {}", e);
                    continue;
                }
            };

            if self.dispatch(command).await.is_break() {
                return Ok(());
            }
        }

        info!("Client stream ended");
        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> ControlFlow<()> {
        let sent = match command {
            Command::Key(key) => match OffsetRequest::for_key(key, self.page_size) {
                Some(request) => self.tx.offset.send(request).await.is_ok(),
                None => {
                    warn!("Skipping unknown key {:?}", key);
                    true
                }
            },
            Command::ModeControl(mode) => {
                info!("Setting {} mode", mode);
                self.tx.mode.send(mode).await.is_ok()
            }
            Command::SearchValue(text) => {
                debug!("Processing search value: {:?}", text);
                self.tx.search.send(text).await.is_ok()
            }
            Command::Close => {
                info!("Received close command from client");
                return ControlFlow::Break(());
            }
        };

        if sent {
            ControlFlow::Continue(())
        } else {
            debug!("Multiplexer gone, stopping reader");
            ControlFlow::Break(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(json: &str) -> Result<Message, axum::Error> {
        Ok(Message::Text(json.to_string().into()))
    }

    #[test]
    fn decodes_every_command_type() {
        assert_eq!(
            Command::decode(r#"{"type":"KEY","message":"j"}"#).unwrap(),
            Command::Key('j')
        );
        assert_eq!(
            Command::decode(r#"{"type":"MODE_CTL","message":"SEARCH"}"#).unwrap(),
            Command::ModeControl(Mode::Search)
        );
        assert_eq!(
            Command::decode(r#"{"type":"SEARCH_VAL","message":"timeout"}"#).unwrap(),
            Command::SearchValue("timeout".into())
        );
        assert_eq!(
            Command::decode(r#"{"type":"CLOSE","message":""}"#).unwrap(),
            Command::Close
        );
        assert_eq!(Command::decode(r#"{"type":"CLOSE"}"#).unwrap(), Command::Close);
    }

    #[test]
    fn protocol_errors_are_not_fatal() {
        let unknown = Command::decode(r#"{"type":"RESIZE","message":"80x24"}"#).unwrap_err();
        assert!(matches!(unknown, CommandError::UnknownType(ref t) if t == "RESIZE"));
        assert!(!unknown.is_fatal());

        let mode = Command::decode(r#"{"type":"MODE_CTL","message":"ON"}"#).unwrap_err();
        assert!(matches!(mode, CommandError::UnknownMode(_)));
        assert!(!mode.is_fatal());

        let key = Command::decode(r#"{"type":"KEY","message":"jj"}"#).unwrap_err();
        assert!(matches!(key, CommandError::InvalidKey(_)));
        assert!(!key.is_fatal());
    }

    #[test]
    fn malformed_json_is_fatal() {
        let err = Command::decode("{not json").unwrap_err();
        assert!(err.is_fatal());
        let err = Command::decode(r#"{"message":"j"}"#).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn control_frames() {
        assert_eq!(Command::from_message(Message::Close(None)).unwrap(), Some(Command::Close));
        assert_eq!(Command::from_message(Message::Ping(Vec::new().into())).unwrap(), None);
        let binary = Command::from_message(Message::Binary(vec![1, 2].into())).unwrap_err();
        assert!(!binary.is_fatal());
    }

    #[test]
    fn keys_map_to_offset_requests() {
        assert_eq!(OffsetRequest::for_key('j', 8192), Some(OffsetRequest::By(8192)));
        assert_eq!(OffsetRequest::for_key('k', 8192), Some(OffsetRequest::By(-8192)));
        assert_eq!(OffsetRequest::for_key('J', 8192), Some(OffsetRequest::ToEnd));
        assert_eq!(OffsetRequest::for_key('K', 8192), Some(OffsetRequest::ToStart));
        assert_eq!(OffsetRequest::for_key('x', 8192), None);
    }

    #[tokio::test]
    async fn reader_forwards_commands_in_order() {
        let frames = futures::stream::iter(vec![
            text(r#"{"type":"KEY","message":"j"}"#),
            text(r#"{"type":"BOGUS","message":""}"#),
            text(r#"{"type":"MODE_CTL","message":"SEARCH"}"#),
            text(r#"{"type":"SEARCH_VAL","message":"err"}"#),
            text(r#"{"type":"KEY","message":"k"}"#),
            text(r#"{"type":"CLOSE"}"#),
            text(r#"{"type":"KEY","message":"j"}"#),
        ]);
        let (tx, mut rx) = command_channels();
        let reader = tokio::spawn(CommandReader::new(frames, tx, 100).run());

        assert_eq!(rx.offset.recv().await, Some(OffsetRequest::By(100)));
        assert_eq!(rx.mode.recv().await, Some(Mode::Search));
        assert_eq!(rx.search.recv().await.as_deref(), Some("err"));
        assert_eq!(rx.offset.recv().await, Some(OffsetRequest::By(-100)));

        reader.await.unwrap().unwrap();
        // Nothing after CLOSE is forwarded, and the senders are gone
        assert_eq!(rx.offset.recv().await, None);
    }

    #[tokio::test]
    async fn decode_failure_ends_reader_with_error() {
        let frames = futures::stream::iter(vec![text("garbage")]);
        let (tx, _rx) = command_channels();
        let result = CommandReader::new(frames, tx, 100).run().await;
        assert!(matches!(result, Err(SessionError::Command(CommandError::Decode(_)))));
    }

    #[tokio::test]
    async fn transport_error_ends_reader_with_error() {
        let frames = futures::stream::iter(vec![Err(axum::Error::new(std::io::Error::other(
            "connection reset",
        )))]);
        let (tx, _rx) = command_channels();
        let result = CommandReader::new(frames, tx, 100).run().await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }

    #[tokio::test]
    async fn send_blocks_until_consumed() {
        let frames = futures::stream::iter(vec![
            text(r#"{"type":"KEY","message":"j"}"#),
            text(r#"{"type":"KEY","message":"j"}"#),
            text(r#"{"type":"KEY","message":"j"}"#),
        ]);
        let (tx, mut rx) = command_channels();
        let reader = tokio::spawn(CommandReader::new(frames, tx, 1).run());

        // One request fits in the channel, the reader then waits on the next send
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!reader.is_finished());

        for _ in 0..3 {
            assert_eq!(rx.offset.recv().await, Some(OffsetRequest::By(1)));
        }
        reader.await.unwrap().unwrap();
    }
}
