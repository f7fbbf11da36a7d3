//! The hub: entry point tying the registry, the broadcast channel and the
//! dispatcher together.

use crate::broadcast::{self, BroadcastSender, DEFAULT_CHANNEL_CAPACITY};
use crate::connection::ConnectionHandle;
use crate::dispatcher::Dispatcher;
use crate::handler::{self, HandlerContext, HandlerExit, RegistrationGuard};
use crate::metrics;
use crate::registry::{Registry, DEFAULT_CLOSE_TIMEOUT};
use crate::stats::{HubStats, HubStatsSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thermosync_transport::Connection;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// `max_connections` connections are already registered.
    #[error("Maximum connections reached")]
    CapacityReached,

    /// The hub is shutting down and takes no new connections.
    #[error("Hub is shutting down")]
    ShuttingDown,

    /// A connection with the same ID is already registered.
    #[error("Connection already registered: {0}")]
    DuplicateConnection(String),
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Pending messages the broadcast channel holds before submitters wait.
    pub channel_capacity: usize,
    /// How long a handler waits for channel capacity before dropping a message.
    pub submit_timeout: Duration,
    /// How long a single write may take before the connection is dropped.
    pub write_timeout: Duration,
    /// Upper bound on a transport close handshake.
    pub close_timeout: Duration,
    /// Connections accepted at most at any one time.
    pub max_connections: usize,
    /// Terminate a connection that sends an undecodable frame instead of
    /// skipping the frame.
    pub close_on_malformed: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            submit_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            max_connections: 100_000,
            close_on_malformed: false,
        }
    }
}

struct HubInner {
    registry: Arc<Registry>,
    sender: BroadcastSender,
    stats: Arc<HubStats>,
    config: HubConfig,
    shutdown: watch::Sender<bool>,
    shutting_down: AtomicBool,
}

/// Handle to a running hub. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    /// Create a hub and spawn its dispatcher.
    ///
    /// The returned task finishes after [`Hub::shutdown`] once every queued
    /// message has been fanned out. Must be called from within a tokio
    /// runtime.
    #[must_use]
    pub fn start(config: HubConfig) -> (Self, JoinHandle<()>) {
        info!("Starting hub with config: {:?}", config);

        let registry = Arc::new(Registry::with_close_timeout(config.close_timeout));
        let stats = Arc::new(HubStats::default());
        let (sender, receiver) = broadcast::channel(config.channel_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            receiver,
            Arc::clone(&stats),
            config.write_timeout,
            shutdown_rx,
        );
        let task = tokio::spawn(dispatcher.run());

        let hub = Self {
            inner: Arc::new(HubInner {
                registry,
                sender,
                stats,
                config,
                shutdown,
                shutting_down: AtomicBool::new(false),
            }),
        };

        (hub, task)
    }

    /// Register a connection and spawn its handler.
    ///
    /// The connection is visible to the dispatcher before this returns. The
    /// returned task resolves with the reason the handler stopped.
    ///
    /// # Errors
    ///
    /// Refuses the connection, closing it, when the hub is shutting down or
    /// already holds `max_connections` connections.
    pub async fn accept(&self, connection: Connection) -> Result<JoinHandle<HandlerExit>, HubError> {
        let inner = &self.inner;
        let (id, remote_addr, mut sink, stream) = connection.into_parts();

        let rejection = if inner.shutting_down.load(Ordering::SeqCst) {
            Some((HubError::ShuttingDown, "shutting_down"))
        } else if inner.registry.len() >= inner.config.max_connections {
            Some((HubError::CapacityReached, "capacity"))
        } else if inner.registry.contains(&id) {
            Some((HubError::DuplicateConnection(id.to_string()), "duplicate"))
        } else {
            None
        };

        if let Some((error, reason)) = rejection {
            inner.stats.record_rejected();
            metrics::record_rejected(reason);
            warn!(connection = %id, reason, "Rejecting connection");
            if let Err(e) = sink.close().await {
                debug!(connection = %id, error = %e, "Close of rejected connection failed");
            }
            return Err(error);
        }

        let handle = Arc::new(ConnectionHandle::new(id.clone(), remote_addr, sink));
        if !inner.registry.register(Arc::clone(&handle)) {
            // lost a race with a concurrent accept of the same ID
            let _ = handle.close().await;
            inner.stats.record_rejected();
            metrics::record_rejected("duplicate");
            return Err(HubError::DuplicateConnection(id.to_string()));
        }

        // a shutdown that started after the check above may have already
        // collected the registry's ids
        if inner.shutting_down.load(Ordering::SeqCst) {
            if let Some(handle) = inner.registry.remove(&id) {
                inner.registry.close_removed(handle).await;
            }
            inner.stats.record_rejected();
            metrics::record_rejected("shutting_down");
            debug!(connection = %id, "Shutdown raced accept, connection released");
            return Err(HubError::ShuttingDown);
        }

        let guard = RegistrationGuard::new(Arc::clone(&inner.registry), id.clone());
        let ctx = HandlerContext {
            sender: inner.sender.clone(),
            stats: Arc::clone(&inner.stats),
            submit_timeout: inner.config.submit_timeout,
            close_on_malformed: inner.config.close_on_malformed,
        };

        info!(
            connection = %id,
            remote = ?handle.remote_addr(),
            connections = inner.registry.len(),
            "Connection accepted"
        );
        Ok(tokio::spawn(handler::run(handle, stream, guard, ctx)))
    }

    /// Stop the hub.
    ///
    /// New connections are refused, the dispatcher stops taking submissions
    /// and finishes what is queued, and every registered connection is
    /// closed so its handler exits. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down hub");
        inner.shutdown.send_replace(true);
        let closed = inner.registry.close_all().await;
        info!(closed, "Hub stopped accepting, connections closed");
    }

    /// Whether [`Hub::shutdown`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// The hub's connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Hub configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> HubStatsSnapshot {
        self.inner.stats.snapshot(self.inner.registry.len())
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("connections", &self.inner.registry.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
