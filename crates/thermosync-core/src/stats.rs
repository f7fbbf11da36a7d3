//! Hub counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters shared by the handlers and the dispatcher.
#[derive(Debug, Default)]
pub struct HubStats {
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    malformed_frames: AtomicU64,
    messages_dispatched: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    connections_rejected: AtomicU64,
}

impl HubStats {
    pub(crate) fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, delivered: usize, failed: usize) {
        self.messages_dispatched.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.delivery_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self, connections: usize) -> HubStatsSnapshot {
        HubStatsSnapshot {
            connections,
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Hub statistics at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStatsSnapshot {
    /// Registered connections.
    pub connections: usize,
    /// Messages accepted onto the broadcast channel.
    pub messages_received: u64,
    /// Messages dropped because the channel stayed full.
    pub messages_dropped: u64,
    /// Inbound frames that failed to decode.
    pub malformed_frames: u64,
    /// Messages taken off the channel and fanned out.
    pub messages_dispatched: u64,
    /// Successful per-connection writes.
    pub deliveries: u64,
    /// Failed or timed out per-connection writes.
    pub delivery_failures: u64,
    /// Connections refused at accept.
    pub connections_rejected: u64,
}
