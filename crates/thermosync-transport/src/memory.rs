//! In-memory transport.
//!
//! Connections are pairs of bounded tokio channels. The client side exposes
//! hooks to simulate the failures a real network produces: a peer that stops
//! accepting writes, a read error, or an abrupt disconnect.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thermosync_protocol::Frame;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionId, FrameSink, FrameStream, TransportError};

/// Default per-direction buffer of an in-memory connection.
pub const DEFAULT_CAPACITY: usize = 64;

/// Create a connected pair: the server-side [`Connection`] and its client.
#[must_use]
pub fn pair(capacity: usize) -> (Connection, MemoryClient) {
    let capacity = capacity.max(1);
    let (to_server, from_client) = mpsc::channel(capacity);
    let (to_client, from_server) = mpsc::channel(capacity);
    let fail_writes = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));

    let sink = MemorySink {
        tx: Some(to_client),
        fail_writes: Arc::clone(&fail_writes),
        closed: Arc::clone(&closed),
    };
    let stream = MemoryStream { rx: from_client };
    let connection = Connection::new(sink, stream).with_remote_addr("memory");

    let client = MemoryClient {
        id: connection.id().clone(),
        to_server: Some(to_server),
        from_server,
        fail_writes,
        closed,
    };

    (connection, client)
}

/// Server-side writer half.
struct MemorySink {
    tx: Option<mpsc::Sender<Frame>>,
    fail_writes: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("peer stopped reading".into()));
        }

        match &self.tx {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| TransportError::ConnectionClosed),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.tx.is_some() {
            self.closed.store(true, Ordering::SeqCst);
            self.tx = None;
        }
        Ok(())
    }
}

/// Server-side reader half.
struct MemoryStream {
    rx: mpsc::Receiver<Result<Frame, TransportError>>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Client end of an in-memory connection.
pub struct MemoryClient {
    id: ConnectionId,
    to_server: Option<mpsc::Sender<Result<Frame, TransportError>>>,
    from_server: mpsc::Receiver<Frame>,
    fail_writes: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryClient {
    /// ID of the matching server-side connection.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the client disconnected or the server dropped
    /// its reader.
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        match &self.to_server {
            Some(tx) => tx
                .send(Ok(frame))
                .await
                .map_err(|_| TransportError::ConnectionClosed),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    /// Send a text frame to the server.
    ///
    /// # Errors
    ///
    /// See [`MemoryClient::send`].
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(Frame::text(text)).await
    }

    /// Wait for the next frame from the server.
    ///
    /// Returns `None` once the server has closed the connection and every
    /// buffered frame has been read.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_server.recv().await
    }

    /// Wait at most `timeout` for the next frame.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.from_server.recv())
            .await
            .ok()
            .flatten()
    }

    /// Take a frame if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_server.try_recv().ok()
    }

    /// Make every subsequent server write to this client fail.
    pub fn break_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Deliver a read error to the server's reader.
    pub async fn fail_read(&self, reason: impl Into<String>) {
        if let Some(tx) = &self.to_server {
            let _ = tx
                .send(Err(TransportError::ReceiveFailed(reason.into())))
                .await;
        }
    }

    /// Hang up. The server's reader sees a clean end of stream.
    pub fn disconnect(&mut self) {
        self.to_server.take();
    }

    /// Whether the server closed this connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
