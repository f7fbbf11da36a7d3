//! Connections upgraded by axum.
//!
//! The HTTP layer owns the upgrade handshake; once `WebSocketUpgrade`
//! hands over the socket, [`from_socket`] turns it into a [`Connection`].

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use thermosync_protocol::Frame;
use tracing::debug;

use crate::traits::{Connection, FrameSink, FrameStream, TransportError};

/// Wrap an upgraded axum socket as a [`Connection`].
#[must_use]
pub fn from_socket(socket: WebSocket, remote_addr: Option<SocketAddr>) -> Connection {
    let (sink, stream) = socket.split();
    let connection = Connection::new(
        AxumSink {
            inner: sink,
            closed: false,
        },
        AxumFrames { inner: stream },
    );

    match remote_addr {
        Some(addr) => connection.with_remote_addr(addr),
        None => connection,
    }
}

struct AxumSink {
    inner: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for AxumSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data.to_vec()),
        };

        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }
}

struct AxumFrames {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameStream for AxumFrames {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text))),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Frame::Binary(Bytes::from(data))))
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
