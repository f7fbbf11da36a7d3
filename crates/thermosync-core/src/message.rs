//! Messages flowing through the broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thermosync_protocol::MessageBody;
use thermosync_transport::ConnectionId;

/// A unique message identifier.
pub type MessageId = u64;

/// Process-wide message sequence.
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A decoded inbound message on its way to every connection.
///
/// Built by a connection handler and consumed once by the dispatcher. There
/// is no way to mutate it after construction.
#[derive(Debug, Clone)]
pub struct Message {
    id: MessageId,
    source: ConnectionId,
    body: MessageBody,
    received_at: u64,
}

impl Message {
    /// Create a new message received from `source`.
    #[must_use]
    pub fn new(source: ConnectionId, body: MessageBody) -> Self {
        Self {
            id: generate_message_id(),
            source,
            body,
            received_at: (unix_nanos() / 1_000_000) as u64,
        }
    }

    /// Unique message identifier.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Connection the message was read from.
    #[must_use]
    pub fn source(&self) -> &ConnectionId {
        &self.source
    }

    /// Decoded body.
    #[must_use]
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Unix timestamp in milliseconds at which the message was decoded.
    #[must_use]
    pub fn received_at(&self) -> u64 {
        self.received_at
    }
}
