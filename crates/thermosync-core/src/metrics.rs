//! Metric recording for the hub.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding binary installs a recorder.

use metrics::{counter, gauge, histogram};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "thermosync_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "thermosync_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "thermosync_connections_rejected_total";
    pub const MESSAGES_TOTAL: &str = "thermosync_messages_total";
    pub const MESSAGES_DROPPED: &str = "thermosync_messages_dropped_total";
    pub const MALFORMED_FRAMES: &str = "thermosync_malformed_frames_total";
    pub const DELIVERIES_TOTAL: &str = "thermosync_deliveries_total";
    pub const DELIVERY_FAILURES: &str = "thermosync_delivery_failures_total";
    pub const DISPATCH_SECONDS: &str = "thermosync_dispatch_seconds";
}

/// Register descriptions for every hub metric.
pub fn describe_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of registered connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused because the hub was full or shutting down"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Messages accepted for broadcast");
    metrics::describe_counter!(
        names::MESSAGES_DROPPED,
        "Messages dropped because the broadcast channel stayed full"
    );
    metrics::describe_counter!(names::MALFORMED_FRAMES, "Inbound frames that failed to decode");
    metrics::describe_counter!(names::DELIVERIES_TOTAL, "Successful per-connection writes");
    metrics::describe_counter!(
        names::DELIVERY_FAILURES,
        "Per-connection writes that failed or timed out"
    );
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Time to fan out one message to every connection"
    );
}

pub(crate) fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

pub(crate) fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

pub(crate) fn record_rejected(reason: &'static str) {
    counter!(names::CONNECTIONS_REJECTED, "reason" => reason).increment(1);
}

pub(crate) fn record_inbound() {
    counter!(names::MESSAGES_TOTAL).increment(1);
}

pub(crate) fn record_dropped() {
    counter!(names::MESSAGES_DROPPED).increment(1);
}

pub(crate) fn record_malformed() {
    counter!(names::MALFORMED_FRAMES).increment(1);
}

pub(crate) fn record_fanout(delivered: usize, failed: usize, seconds: f64) {
    counter!(names::DELIVERIES_TOTAL).increment(delivered as u64);
    counter!(names::DELIVERY_FAILURES).increment(failed as u64);
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}
