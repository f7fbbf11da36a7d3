//! Shared handle to the writable side of a connection.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thermosync_protocol::Frame;
use thermosync_transport::{ConnectionId, FrameSink, TransportError};
use tokio::sync::{Mutex, Notify};

/// The registry's view of one connection.
///
/// Holds the writer half. The dispatcher is its only writer; the mutex only
/// keeps a close from interleaving with an in-flight write. The reader half
/// never lives here, it stays with the connection's handler task.
pub struct ConnectionHandle {
    id: ConnectionId,
    remote_addr: Option<String>,
    sink: Mutex<Box<dyn FrameSink>>,
    closed: AtomicBool,
    close_notify: Notify,
    connected_at: Instant,
}

impl ConnectionHandle {
    /// Create a handle around a connection's writer half.
    #[must_use]
    pub fn new(id: ConnectionId, remote_addr: Option<String>, sink: Box<dyn FrameSink>) -> Self {
        Self {
            id,
            remote_addr,
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            connected_at: Instant::now(),
        }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Peer address, if the transport reported one.
    #[must_use]
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// When the handle was created.
    #[must_use]
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Whether the connection has been closed by the hub.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write one frame.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the hub already closed this connection,
    /// or whatever the transport reports.
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        // a close may have won the lock race
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        sink.send(frame).await
    }

    /// Mark the connection closed and wake its handler.
    ///
    /// Returns `true` on the first call only.
    pub(crate) fn mark_closed(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        if first {
            self.close_notify.notify_waiters();
        }
        first
    }

    /// Close the connection and release the transport.
    ///
    /// Safe to call any number of times from any task.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the close handshake fails. The
    /// connection counts as closed either way.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.mark_closed();
        self.sink.lock().await.close().await
    }

    /// Resolves once the connection has been closed by the hub.
    pub async fn closed(&self) {
        loop {
            let notified = self.close_notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use thermosync_transport::memory;

    fn handle() -> (Arc<ConnectionHandle>, memory::MemoryClient) {
        let (connection, client) = memory::pair(memory::DEFAULT_CAPACITY);
        let (id, addr, sink, _stream) = connection.into_parts();
        (Arc::new(ConnectionHandle::new(id, addr, sink)), client)
    }

    #[tokio::test]
    async fn test_send_then_close() {
        let (handle, mut client) = handle();

        handle.send(Frame::text("a")).await.unwrap();
        assert_eq!(client.recv().await, Some(Frame::text("a")));

        handle.close().await.unwrap();
        assert!(handle.is_closed());
        assert!(client.is_closed());
        assert!(matches!(
            handle.send(Frame::text("b")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_twice() {
        let (handle, _client) = handle();
        assert!(handle.close().await.is_ok());
        assert!(handle.close().await.is_ok());
        assert!(!handle.mark_closed());
    }

    #[tokio::test]
    async fn test_closed_wakes_waiter() {
        let (handle, _client) = handle();

        let waiter = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.closed().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        handle.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_returns_immediately_when_already_closed() {
        let (handle, _client) = handle();
        handle.close().await.unwrap();
        tokio::time::timeout(Duration::from_millis(100), handle.closed())
            .await
            .unwrap();
    }
}
