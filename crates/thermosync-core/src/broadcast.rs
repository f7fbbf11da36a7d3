//! The broadcast channel.
//!
//! A bounded tokio mpsc channel shared by every connection handler (senders)
//! and the dispatcher (sole receiver). Senders waiting for capacity are served
//! in the order they started waiting, so messages leave the channel in the
//! order they were submitted across all handlers.

use crate::message::Message;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

/// Default broadcast channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Why a message could not be submitted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The channel stayed full for the whole submit timeout; the message was
    /// dropped.
    #[error("Broadcast channel full for {0:?}, message dropped")]
    Timeout(Duration),

    /// The dispatcher is gone; the hub is shutting down.
    #[error("Broadcast channel closed")]
    Closed,
}

/// Submitting half of the broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSender {
    tx: mpsc::Sender<Message>,
}

/// Receiving half of the broadcast channel, owned by the dispatcher.
#[derive(Debug)]
pub struct BroadcastReceiver {
    rx: mpsc::Receiver<Message>,
}

/// Create a broadcast channel holding at most `capacity` pending messages.
#[must_use]
pub fn channel(capacity: usize) -> (BroadcastSender, BroadcastReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BroadcastSender { tx }, BroadcastReceiver { rx })
}

impl BroadcastSender {
    /// Submit a message, waiting at most `timeout` for capacity.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Timeout`] if the channel stayed full, and
    /// [`SubmitError::Closed`] once the receiver has been closed or dropped.
    pub async fn submit(&self, message: Message, timeout: Duration) -> Result<(), SubmitError> {
        self.tx
            .send_timeout(message, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => SubmitError::Timeout(timeout),
                SendTimeoutError::Closed(_) => SubmitError::Closed,
            })
    }

    /// Whether the receiving side is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Free slots right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

impl BroadcastReceiver {
    /// Wait for the next message.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Stop accepting submissions. Already queued messages can still be
    /// received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermosync_protocol::MessageBody;

    fn msg(text: &str) -> Message {
        Message::new("conn-1".into(), MessageBody::new(text))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = channel(8);
        for text in ["a", "b", "c"] {
            tx.submit(msg(text), Duration::from_millis(10)).await.unwrap();
        }

        for text in ["a", "b", "c"] {
            assert_eq!(rx.recv().await.unwrap().body().text, text);
        }
    }

    #[tokio::test]
    async fn test_submit_times_out_when_full() {
        let (tx, mut rx) = channel(1);
        tx.submit(msg("first"), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(tx.available(), 0);

        let result = tx.submit(msg("second"), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(SubmitError::Timeout(_))));

        // the dropped message never shows up
        assert_eq!(rx.recv().await.unwrap().body().text, "first");
        rx.close();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (tx, mut rx) = channel(4);
        tx.submit(msg("queued"), Duration::from_millis(10))
            .await
            .unwrap();

        rx.close();
        assert!(tx.is_closed());
        assert!(matches!(
            tx.submit(msg("late"), Duration::from_millis(10)).await,
            Err(SubmitError::Closed)
        ));

        assert_eq!(rx.recv().await.unwrap().body().text, "queued");
        assert!(rx.recv().await.is_none());
    }
}
