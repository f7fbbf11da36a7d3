//! Registry of live connections.
//!
//! The registry is the only state shared between connection handlers and the
//! dispatcher. Every read and mutation goes through the map's sharded locks,
//! and no lock is ever held across an `.await`.

use crate::connection::ConnectionHandle;
use crate::metrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thermosync_transport::ConnectionId;
use tracing::{debug, warn};

/// Default upper bound on a transport close handshake.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// The set of connections eligible to receive broadcasts.
#[derive(Debug)]
pub struct Registry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    close_timeout: Duration,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_close_timeout(DEFAULT_CLOSE_TIMEOUT)
    }

    /// Create an empty registry that gives up on a close handshake after
    /// `close_timeout`.
    #[must_use]
    pub fn with_close_timeout(close_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            close_timeout,
        }
    }

    /// Add a connection.
    ///
    /// Returns `false` and leaves the registry untouched if a connection with
    /// the same ID is already present.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> bool {
        match self.connections.entry(handle.id().clone()) {
            Entry::Occupied(_) => {
                debug!(connection = %handle.id(), "Already registered");
                false
            }
            Entry::Vacant(slot) => {
                debug!(connection = %handle.id(), "Registered");
                slot.insert(handle);
                metrics::record_connection();
                true
            }
        }
    }

    /// Remove a connection without closing its transport.
    ///
    /// The handle is marked closed before it is returned, so the owning
    /// handler stops reading and no further writes go through.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.connections.remove(id)?;
        handle.mark_closed();
        metrics::record_disconnection();
        debug!(connection = %id, remaining = self.connections.len(), "Unregistered");
        Some(handle)
    }

    /// Remove a connection and release its transport.
    ///
    /// Returns `true` if the connection was present. Removing an absent
    /// connection is a no-op. Close errors are logged, not returned.
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let Some(handle) = self.remove(id) else {
            return false;
        };

        self.close_removed(handle).await;
        true
    }

    /// Remove a connection now and close its transport in the background.
    ///
    /// Usable where waiting is not an option: the dispatcher's fan-out and
    /// `Drop` impls. Without a tokio runtime the transport is released when
    /// the last handle reference goes away.
    pub fn unregister_detached(&self, id: &ConnectionId) -> bool {
        let Some(handle) = self.remove(id) else {
            return false;
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let close_timeout = self.close_timeout;
            runtime.spawn(close_with_timeout(handle, close_timeout));
        }
        true
    }

    /// Close a handle previously returned by [`Registry::remove`].
    pub(crate) async fn close_removed(&self, handle: Arc<ConnectionHandle>) {
        close_with_timeout(handle, self.close_timeout).await;
    }

    /// Point-in-time copy of the registered connections.
    ///
    /// Connections registered or removed after this returns are not
    /// reflected in the result.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Look up a connection.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a connection is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Unregister every connection. Returns how many were removed.
    pub async fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = 0;
        for id in ids {
            if self.unregister(&id).await {
                closed += 1;
            }
        }
        closed
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

async fn close_with_timeout(handle: Arc<ConnectionHandle>, close_timeout: Duration) {
    match tokio::time::timeout(close_timeout, handle.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(connection = %handle.id(), error = %e, "Failed to close connection"),
        Err(_) => warn!(connection = %handle.id(), "Timed out closing connection"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermosync_transport::memory::{self, MemoryClient};

    fn handle() -> (Arc<ConnectionHandle>, MemoryClient) {
        let (connection, client) = memory::pair(memory::DEFAULT_CAPACITY);
        let (id, addr, sink, _stream) = connection.into_parts();
        (Arc::new(ConnectionHandle::new(id, addr, sink)), client)
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = Registry::new();
        let (h, client) = handle();

        assert!(registry.register(Arc::clone(&h)));
        assert!(registry.contains(h.id()));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(h.id()).await);
        assert!(registry.is_empty());
        assert!(h.is_closed());
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_register_duplicate_is_noop() {
        let registry = Registry::new();
        let (h, _client) = handle();

        assert!(registry.register(Arc::clone(&h)));
        assert!(!registry.register(Arc::clone(&h)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_twice() {
        let registry = Registry::new();
        let (h1, _c1) = handle();
        let (h2, _c2) = handle();
        registry.register(Arc::clone(&h1));
        registry.register(Arc::clone(&h2));

        assert!(registry.unregister(h1.id()).await);
        assert!(!registry.unregister(h1.id()).await);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(h2.id()));
        assert!(!h2.is_closed());
    }

    #[tokio::test]
    async fn test_unregister_absent() {
        let registry = Registry::new();
        assert!(!registry.unregister(&"missing".into()).await);
        assert!(registry.remove(&"missing".into()).is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_point_in_time() {
        let registry = Registry::new();
        let (h1, _c1) = handle();
        let (h2, _c2) = handle();
        registry.register(Arc::clone(&h1));

        let snapshot = registry.snapshot();
        registry.register(Arc::clone(&h2));
        registry.unregister(h1.id()).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), h1.id());
        assert_eq!(registry.snapshot()[0].id(), h2.id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutation() {
        let registry = Arc::new(Registry::new());
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (h, _client) = handle();
                    assert!(registry.register(Arc::clone(&h)));
                    let _ = registry.snapshot();
                    assert!(registry.unregister(h.id()).await);
                    assert!(!registry.unregister(h.id()).await);
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_detached() {
        let registry = Registry::new();
        let (h, mut client) = handle();
        registry.register(Arc::clone(&h));

        assert!(registry.unregister_detached(h.id()));
        assert!(!registry.unregister_detached(h.id()));
        assert!(registry.is_empty());
        assert!(h.is_closed());

        // the background close drops the server side of the pipe
        assert!(client.recv().await.is_none());
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = Registry::new();
        let mut clients = Vec::new();
        for _ in 0..3 {
            let (h, client) = handle();
            registry.register(h);
            clients.push(client);
        }

        assert_eq!(registry.close_all().await, 3);
        assert!(registry.is_empty());
        assert!(clients.iter().all(MemoryClient::is_closed));
    }
}
