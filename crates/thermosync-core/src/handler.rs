//! Per-connection read loop.
//!
//! Each accepted connection gets one handler task. The handler is the only
//! reader of its connection; it decodes inbound frames and submits them to
//! the broadcast channel until the connection stops being usable.

use crate::broadcast::{BroadcastSender, SubmitError};
use crate::connection::ConnectionHandle;
use crate::message::Message;
use crate::metrics;
use crate::registry::Registry;
use crate::stats::HubStats;
use std::sync::Arc;
use std::time::Duration;
use thermosync_protocol::codec;
use thermosync_transport::{ConnectionId, FrameStream};
use tracing::{debug, trace, warn};

/// Why a connection handler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerExit {
    /// The peer closed the connection.
    PeerClosed,
    /// Reading from the transport failed.
    ReadFailed,
    /// A frame failed to decode and the hub is configured to drop such peers.
    Malformed,
    /// The hub closed the connection (failed write or shutdown).
    ClosedByHub,
    /// The broadcast channel is closed.
    Shutdown,
}

/// Everything a handler needs besides its own connection.
#[derive(Clone)]
pub(crate) struct HandlerContext {
    pub(crate) sender: BroadcastSender,
    pub(crate) stats: Arc<HubStats>,
    pub(crate) submit_timeout: Duration,
    pub(crate) close_on_malformed: bool,
}

/// Keeps a connection registered for as long as its handler runs.
///
/// Dropping the guard without [`RegistrationGuard::release`] (a panic or an
/// aborted task) still removes the connection and closes it in the
/// background.
pub(crate) struct RegistrationGuard {
    registry: Arc<Registry>,
    id: ConnectionId,
    released: bool,
}

impl RegistrationGuard {
    pub(crate) fn new(registry: Arc<Registry>, id: ConnectionId) -> Self {
        Self {
            registry,
            id,
            released: false,
        }
    }

    /// Unregister and wait for the transport to close.
    pub(crate) async fn release(mut self) {
        let removed = self.registry.remove(&self.id);
        self.released = true;
        if let Some(handle) = removed {
            self.registry.close_removed(handle).await;
        }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if !self.released && self.registry.unregister_detached(&self.id) {
            warn!(connection = %self.id, "Handler ended abnormally, connection released");
        }
    }
}

/// Pump frames from one connection into the broadcast channel.
pub(crate) async fn run(
    handle: Arc<ConnectionHandle>,
    mut stream: Box<dyn FrameStream>,
    guard: RegistrationGuard,
    ctx: HandlerContext,
) -> HandlerExit {
    let id = handle.id().clone();
    debug!(connection = %id, remote = ?handle.remote_addr(), "Handler started");

    let exit = loop {
        let next = tokio::select! {
            biased;

            () = handle.closed() => break HandlerExit::ClosedByHub,
            next = stream.recv() => next,
        };

        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => break HandlerExit::PeerClosed,
            Err(e) => {
                debug!(connection = %id, error = %e, "Read failed");
                break HandlerExit::ReadFailed;
            }
        };

        let body = match codec::decode(&frame) {
            Ok(body) => body,
            Err(e) => {
                ctx.stats.record_malformed();
                metrics::record_malformed();
                warn!(connection = %id, kind = %frame.kind(), error = %e, "Malformed frame");
                if ctx.close_on_malformed {
                    break HandlerExit::Malformed;
                }
                continue;
            }
        };

        let message = Message::new(id.clone(), body);
        let message_id = message.id();

        match ctx.sender.submit(message, ctx.submit_timeout).await {
            Ok(()) => {
                ctx.stats.record_received();
                metrics::record_inbound();
                trace!(connection = %id, message = message_id, "Submitted");
            }
            Err(e @ SubmitError::Timeout(_)) => {
                ctx.stats.record_dropped();
                metrics::record_dropped();
                warn!(connection = %id, message = message_id, error = %e, "Dropping message");
            }
            Err(SubmitError::Closed) => break HandlerExit::Shutdown,
        }
    };

    guard.release().await;
    debug!(connection = %id, reason = ?exit, "Handler stopped");

    exit
}
