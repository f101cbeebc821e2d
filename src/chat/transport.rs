//! Push-channel plumbing.
//!
//! [`Connector`] opens a [`ChatChannel`]; the channel only queues outbound
//! frames, it never waits on the server. Inbound traffic does not flow through
//! the channel at all: the connector's reader task forwards decoded
//! [`ChannelEvent`]s over an mpsc queue that the driver loop owns for the
//! lifetime of the process, across reconnects. Every event is tagged with the
//! [`ChannelId`] of the connection it came from, so frames still queued from a
//! torn-down connection can be told apart from the live one.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::protocol::{decode_inbound, encode_outbound, InboundEvent, OutboundEvent};
use crate::error::DevroomError;

/// What the driver loop hears from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A decoded server frame.
    Inbound(InboundEvent),
    /// Socket-level fault. The channel may still be open.
    Error(String),
    /// The server closed the connection or the socket died.
    Closed,
}

/// Identity of one connection, unique per connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// A [`ChannelEvent`] and the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub channel: ChannelId,
    pub event: ChannelEvent,
}

/// Outbound half of an established connection.
pub trait ChatChannel: Send {
    fn id(&self) -> ChannelId;

    /// Queue `event` for transmission. Fire-and-forget: no reply is awaited.
    fn emit(&mut self, event: &OutboundEvent) -> Result<(), DevroomError>;

    /// Tear the connection down. Frames queued before the call are still sent.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens channels to the chat server.
#[async_trait]
pub trait Connector: Send {
    type Channel: ChatChannel;

    async fn connect(&mut self) -> Result<Self::Channel, DevroomError>;
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

type WsRead = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connects to the chat server over WebSocket.
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
    next_id: u64,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl WsConnector {
    /// Create a connector for `url`. The returned receiver yields inbound
    /// events from every channel this connector opens.
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                url: url.into(),
                connect_timeout,
                next_id: 0,
                events_tx,
            },
            events_rx,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Channel = WsChannel;

    async fn connect(&mut self) -> Result<WsChannel, DevroomError> {
        debug!(url = %self.url, "opening chat channel");
        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| {
                    DevroomError::Channel(format!(
                        "connecting to {} timed out after {:?}",
                        self.url, self.connect_timeout
                    ))
                })?
                .map_err(|e| DevroomError::Channel(format!("connecting to {}: {e}", self.url)))?;

        let (mut sink, read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let is_close = matches!(msg, WsMessage::Close(_));
                if let Err(e) = sink.send(msg).await {
                    warn!(error = %e, "chat frame could not be written");
                    break;
                }
                if is_close {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        self.next_id += 1;
        let id = ChannelId(self.next_id);
        let reader = tokio::spawn(read_loop(read, id, self.events_tx.clone()));

        info!(url = %self.url, channel = id.0, "chat channel open");
        Ok(WsChannel {
            id,
            outbound_tx,
            writer,
            reader,
            open: true,
        })
    }
}

async fn read_loop(
    mut read: WsRead,
    channel: ChannelId,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
) {
    let forward = |event| events_tx.send(TaggedEvent { channel, event }).is_ok();
    while let Some(frame) = read.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match decode_inbound(&text) {
                Ok(event) => {
                    if !forward(ChannelEvent::Inbound(event)) {
                        return;
                    }
                }
                Err(e) => {
                    debug!(error = %e, frame = %text, "ignoring undecodable chat frame");
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                forward(ChannelEvent::Error(e.to_string()));
                break;
            }
        }
    }
    forward(ChannelEvent::Closed);
}

/// A live WebSocket connection: a writer task fed by an unbounded queue and a
/// reader task forwarding inbound frames.
pub struct WsChannel {
    id: ChannelId,
    outbound_tx: mpsc::UnboundedSender<WsMessage>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    open: bool,
}

impl ChatChannel for WsChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn emit(&mut self, event: &OutboundEvent) -> Result<(), DevroomError> {
        if !self.open || self.writer.is_finished() {
            return Err(DevroomError::NotConnected);
        }
        let text = encode_outbound(event)
            .map_err(|e| DevroomError::Channel(format!("encoding frame: {e}")))?;
        self.outbound_tx
            .send(WsMessage::Text(text))
            .map_err(|_| DevroomError::NotConnected)
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        // A locally requested close must not be reported back as a remote one.
        self.reader.abort();
        let _ = self.outbound_tx.send(WsMessage::Close(None));
    }

    fn is_open(&self) -> bool {
        self.open && !self.writer.is_finished()
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}
