//! The dispatcher: sole consumer of the broadcast channel.
//!
//! For every message it takes a snapshot of the registry and writes the
//! encoded frame to each connection in it. A connection whose write fails or
//! stalls past the write timeout is unregistered; the others still get the
//! message. The next message is not taken until the current fan-out is done,
//! so every connection sees messages in channel order.

use crate::broadcast::BroadcastReceiver;
use crate::message::Message;
use crate::metrics;
use crate::registry::Registry;
use crate::stats::HubStats;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thermosync_protocol::codec;
use thermosync_transport::TransportError;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Outcome of fanning out one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connections the message was written to.
    pub delivered: usize,
    /// Connections whose write failed; they have been unregistered.
    ///
    /// Connections the hub closed between the snapshot and the write are
    /// neither delivered nor failed.
    pub failed: usize,
}

/// Fan-out loop.
pub struct Dispatcher {
    registry: Arc<Registry>,
    receiver: BroadcastReceiver,
    stats: Arc<HubStats>,
    write_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry` fed by `receiver`.
    ///
    /// [`Hub::start`](crate::Hub::start) wires one up; building one by hand
    /// is for driving [`Dispatcher::dispatch`] directly.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        receiver: BroadcastReceiver,
        stats: Arc<HubStats>,
        write_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            receiver,
            stats,
            write_timeout,
            shutdown,
        }
    }

    /// Run until shutdown is signalled and every queued message is out.
    pub async fn run(mut self) {
        info!("Dispatcher started");
        let mut draining = false;

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed(), if !draining => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!("Closing broadcast feed");
                        self.receiver.close();
                        draining = true;
                    }
                }

                next = self.receiver.recv() => match next {
                    Some(message) => {
                        self.dispatch(message).await;
                    }
                    None => break,
                },
            }
        }

        info!("Dispatcher stopped");
    }

    /// Write one message to every registered connection.
    pub async fn dispatch(&self, message: Message) -> DispatchReport {
        let started = Instant::now();

        let frame = match codec::encode(message.body()) {
            Ok(frame) => frame,
            Err(e) => {
                error!(message = message.id(), error = %e, "Failed to encode message");
                return DispatchReport::default();
            }
        };

        let targets = self.registry.snapshot();
        let writes = targets.iter().map(|handle| {
            let frame = frame.clone();
            async move {
                let result = tokio::time::timeout(self.write_timeout, handle.send(frame)).await;
                (handle, result)
            }
        });

        let mut report = DispatchReport::default();
        for (handle, result) in join_all(writes).await {
            match result {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(TransportError::ConnectionClosed)) if handle.is_closed() => {
                    // closed by the hub after the snapshot was taken
                    trace!(connection = %handle.id(), "Skipped closed connection");
                    self.registry.unregister_detached(handle.id());
                    continue;
                }
                Ok(Err(e)) => {
                    debug!(connection = %handle.id(), error = %e, "Write failed");
                }
                Err(_) => {
                    warn!(
                        connection = %handle.id(),
                        timeout = ?self.write_timeout,
                        "Write timed out"
                    );
                }
            }
            report.failed += 1;
            self.registry.unregister_detached(handle.id());
        }

        self.stats.record_dispatch(report.delivered, report.failed);
        metrics::record_fanout(
            report.delivered,
            report.failed,
            started.elapsed().as_secs_f64(),
        );
        trace!(
            message = message.id(),
            source = %message.source(),
            delivered = report.delivered,
            failed = report.failed,
            "Dispatched"
        );

        report
    }
}
