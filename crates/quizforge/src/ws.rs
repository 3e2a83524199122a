//! WebSocket plumbing: listener and split connections.
//!
//! The engine has exactly one transport, so there is no transport
//! abstraction layer — just the listener and a connection split into an
//! owned reader and writer. The split matters: the handler's select
//! loop reads commands from the socket while the outbound pump writes
//! room events, and neither side may block the other behind a lock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::fmt;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Counter for generating unique connection ids.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Errors from the socket layer.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade handshake failed.
    #[error("websocket handshake failed: {0}")]
    HandshakeFailed(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

type WsStream = WebSocketStream<TcpStream>;

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Accepts WebSocket connections on a TCP listener.
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    /// Binds to the given address.
    pub async fn bind(addr: &str) -> Result<Self, WsError> {
        let listener = TcpListener::bind(addr).await.map_err(WsError::AcceptFailed)?;
        tracing::info!(addr, "websocket listener bound");
        Ok(Self { listener })
    }

    /// The bound local address (useful with port 0 in tests).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and upgrades the next incoming connection.
    pub async fn accept(&self) -> Result<WsConnection, WsError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(WsError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| WsError::HandshakeFailed(e.to_string()))?;

        let id = ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, "accepted websocket connection");

        Ok(WsConnection { id, ws })
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An accepted connection, before splitting.
pub struct WsConnection {
    id: ConnectionId,
    ws: WsStream,
}

impl WsConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Splits into independently owned read and write halves.
    pub fn split(self) -> (WsWriter, WsReader) {
        let (sink, stream) = self.ws.split();
        (
            WsWriter { id: self.id, sink },
            WsReader { id: self.id, stream },
        )
    }
}

/// The owned write half.
pub struct WsWriter {
    id: ConnectionId,
    sink: SplitSink<WsStream, Message>,
}

impl WsWriter {
    /// Sends one binary frame.
    pub async fn send(&mut self, data: Vec<u8>) -> Result<(), WsError> {
        self.sink
            .send(Message::Binary(data.into()))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    /// Closes the connection politely.
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// The owned read half.
pub struct WsReader {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
}

impl WsReader {
    /// Receives the next data frame. Control frames are skipped; text
    /// frames are handed over as bytes. `Ok(None)` means the peer
    /// closed cleanly.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, WsError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => return Err(WsError::ReceiveFailed(e.to_string())),
            }
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}
