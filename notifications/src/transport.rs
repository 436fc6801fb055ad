//! Streaming transport: the `Transport`/`Socket` seam and its WebSocket implementation.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::*;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{transport_error, Error, ErrorKind, TransportErrorKind};

/// Lifecycle of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Idle = 0,
    Connecting = 1,
    Open = 2,
    Closing = 3,
    Closed = 4,
    Aborted = 5,
}

impl From<u8> for TransportState {
    fn from(value: u8) -> Self {
        match value {
            1 => TransportState::Connecting,
            2 => TransportState::Open,
            3 => TransportState::Closing,
            4 => TransportState::Closed,
            5 => TransportState::Aborted,
            _ => TransportState::Idle,
        }
    }
}

/// One complete inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The peer closed the connection.
    Close,
}

/// An open streaming connection.
#[async_trait]
pub trait Socket: Send + Sync {
    fn state(&self) -> TransportState;

    /// Write one complete text frame.
    async fn send(&self, text: &str) -> Result<(), Error>;

    /// Wait for the next complete frame.
    async fn receive(&self) -> Result<Frame, Error>;

    /// Send a normal closure.
    async fn close(&self) -> Result<(), Error>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket. A refused connection is reported as
    /// `TransportErrorKind::ConnectionRefused`.
    async fn connect(&self, url: &Url) -> Result<Arc<dyn Socket>, Error>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> Result<Arc<dyn Socket>, Error> {
        let (stream, response) = connect_async(url.as_str()).await?;
        trace!("WebSocket handshake answered with {}", response.status());

        let (sink, stream) = stream.split();
        Ok(Arc::new(WebSocket {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            state: AtomicU8::new(TransportState::Open as u8),
        }))
    }
}

/// Reading and writing halves are locked independently so a pending receive
/// never blocks an acknowledgement or a close.
pub struct WebSocket {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    state: AtomicU8,
}

impl WebSocket {
    fn set_state(&self, state: TransportState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn failed(&self, kind: TransportErrorKind, err: tokio_tungstenite::tungstenite::Error) -> Error {
        self.set_state(TransportState::Aborted);
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Transport(kind),
        }
    }
}

#[async_trait]
impl Socket for WebSocket {
    fn state(&self) -> TransportState {
        TransportState::from(self.state.load(Ordering::SeqCst))
    }

    async fn send(&self, text: &str) -> Result<(), Error> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| self.failed(TransportErrorKind::Send, e))
    }

    async fn receive(&self) -> Result<Frame, Error> {
        let mut stream = self.stream.lock().await;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Frame::Text(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Peer closed the connection: {frame:?}");
                    self.set_state(TransportState::Closed);
                    return Ok(Frame::Close);
                }
                // Ping, pong and raw frames carry no payload for us.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(self.failed(TransportErrorKind::Receive, e)),
                None => {
                    self.set_state(TransportState::Aborted);
                    return Err(transport_error(
                        TransportErrorKind::Closed,
                        "Stream ended without a close frame.",
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Error> {
        self.set_state(TransportState::Closing);
        let result = self
            .sink
            .lock()
            .await
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: Cow::Borrowed(""),
            })))
            .await;
        self.set_state(TransportState::Closed);

        result.map_err(Error::from)
    }
}
