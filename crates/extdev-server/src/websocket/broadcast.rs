//! Fan-out of payload store events to connected dev clients.
//!
//! The server holds a single store subscription. Each event is encoded once
//! and offered to every registered connection with a non-blocking push; a
//! connection whose queue is full or closed is dropped on the spot, so one
//! stalled client never delays the others.
//!
//! Joining clients are inserted into the connection set *before* the store
//! snapshot is taken. Events racing with the snapshot are buffered by the
//! connection and filtered by per-uuid version, which together guarantee
//! every event reaches every client exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use extdev_core::{BroadcastMessage, ConnectionId, StoreEvent};
use extdev_store::{PayloadStore, StoreSubscription};
use futures::future::join_all;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{ClientConnection, ConnectionState, encode};
use crate::errors::{BroadcastError, ConnectionSendError};
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Broadcasts payload store events to every open connection.
pub struct BroadcastServer {
    store: PayloadStore,
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    cancel: CancellationToken,
    shutting_down: AtomicBool,
    fanout: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl BroadcastServer {
    /// Subscribe to `store` and spawn the fan-out task.
    ///
    /// `cancel` is the parent of every connection's token; cancelling it
    /// stops the fan-out and signals all sessions.
    pub fn start(store: PayloadStore, cancel: CancellationToken, shutdown_timeout: Duration) -> Arc<Self> {
        let subscription = store.subscribe();
        let server = Arc::new(Self {
            store,
            connections: RwLock::new(HashMap::new()),
            cancel,
            shutting_down: AtomicBool::new(false),
            fanout: Mutex::new(None),
            shutdown_timeout,
        });
        let handle = tokio::spawn(run_fanout(
            Arc::downgrade(&server),
            subscription,
            server.cancel.clone(),
        ));
        *server.fanout.lock() = Some(handle);
        server
    }

    /// Token for a new connection; fired on shutdown.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Add a connection and send it the initial snapshot.
    ///
    /// The connection joins the fan-out set first, then the snapshot is
    /// captured, then buffered events newer than the snapshot are flushed.
    /// Returns the number of buffered events forwarded after the snapshot.
    pub fn register(&self, conn: &Arc<ClientConnection>) -> Result<usize, BroadcastError> {
        if self.is_shutting_down() {
            return Err(BroadcastError::ShuttingDown);
        }
        let _ = self
            .connections
            .write()
            .insert(conn.id.clone(), Arc::clone(conn));

        // Shutdown may have drained the set between the check and the insert.
        if self.is_shutting_down() {
            let _ = self.connections.write().remove(&conn.id);
            return Err(BroadcastError::ShuttingDown);
        }

        let snapshot = self.store.snapshot();
        match conn.complete_sync(&snapshot) {
            Ok(forwarded) => {
                info!(
                    conn_id = %conn.id,
                    extensions = snapshot.entries.len(),
                    version = snapshot.version,
                    forwarded,
                    "client synced"
                );
                Ok(forwarded)
            }
            Err(e) => {
                warn!(conn_id = %conn.id, error = %e, "initial sync failed");
                if matches!(e, BroadcastError::Send(_)) {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                }
                self.isolate(conn);
                Err(e)
            }
        }
    }

    /// Remove a connection from the fan-out set.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let removed = self.connections.write().remove(id);
        if removed.is_some() {
            debug!(conn_id = %id, "connection unregistered");
        }
        removed
    }

    /// Push one store event to every connection. Returns how many queued it.
    pub fn broadcast(&self, event: &Arc<StoreEvent>) -> usize {
        let frame = match encode(&BroadcastMessage::from(&**event)) {
            Ok(frame) => frame,
            Err(e) => {
                error!(uuid = %event.uuid(), version = event.version(), error = %e, "dropping unencodable event");
                return 0;
            }
        };

        let conns: Vec<Arc<ClientConnection>> = self.connections.read().values().cloned().collect();
        let mut delivered = 0;
        let mut failed: Vec<(Arc<ClientConnection>, ConnectionSendError)> = Vec::new();
        for conn in conns {
            match conn.deliver(event, &frame) {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => failed.push((conn, e)),
            }
        }

        for (conn, e) in failed {
            warn!(conn_id = %conn.id, error = %e, "isolating connection");
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            self.isolate(&conn);
        }

        debug!(
            kind = event.kind(),
            uuid = %event.uuid(),
            version = event.version(),
            delivered,
            "event broadcast"
        );
        delivered
    }

    fn isolate(&self, conn: &Arc<ClientConnection>) {
        let _ = conn.close();
        let _ = self.unregister(&conn.id);
    }

    /// Stop broadcasting and close every connection. Safe to call repeatedly.
    ///
    /// Waits up to the configured timeout for sessions to finish, then
    /// forces the stragglers to `Closed`.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("broadcast shutdown already in progress");
            return;
        }

        let drained: Vec<Arc<ClientConnection>> =
            self.connections.write().drain().map(|(_, c)| c).collect();
        info!(connections = drained.len(), "broadcast server shutting down");

        for conn in &drained {
            let _ = conn.close();
        }
        self.cancel.cancel();

        let fanout = self.fanout.lock().take();
        if let Some(handle) = fanout {
            let _ = handle.await;
        }

        let wait = join_all(drained.iter().map(|c| c.wait_closed()));
        if tokio::time::timeout(self.shutdown_timeout, wait).await.is_err() {
            let stragglers = drained
                .iter()
                .filter(|c| c.state() != ConnectionState::Closed)
                .count();
            warn!(stragglers, "sessions did not close in time, forcing");
        }
        for conn in &drained {
            conn.mark_closed();
        }
        info!("broadcast server stopped");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Look up a registered connection.
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// The store this server broadcasts.
    pub fn store(&self) -> &PayloadStore {
        &self.store
    }
}

async fn run_fanout(server: Weak<BroadcastServer>, mut subscription: StoreSubscription, cancel: CancellationToken) {
    debug!("broadcast fan-out started");
    loop {
        let event = tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => event,
                None => {
                    info!("payload store closed, stopping fan-out");
                    break;
                }
            },
            () = cancel.cancelled() => break,
        };
        let Some(server) = server.upgrade() else { break };
        let _ = server.broadcast(&event);
    }
    debug!("broadcast fan-out stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use extdev_core::ExtensionPayload;
    use serde_json::Value;
    use tokio::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn payload(hash: &str) -> ExtensionPayload {
        ExtensionPayload::new("ui_extension", "checkout").with_file("index.js", hash)
    }

    fn setup() -> (PayloadStore, Arc<BroadcastServer>) {
        let (store, _writer) = PayloadStore::start(64);
        let server = BroadcastServer::start(store.clone(), CancellationToken::new(), Duration::from_millis(200));
        (store, server)
    }

    fn connect(server: &BroadcastServer, capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(ClientConnection::new(ConnectionId::new(), tx, server.child_token()));
        (conn, rx)
    }

    async fn next(rx: &mut mpsc::Receiver<Arc<String>>) -> Value {
        let frame = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn late_joiner_gets_snapshot_then_updates() {
        let (store, server) = setup();
        let _ = store.upsert("ext-1", payload("hash1")).await.unwrap();

        let (conn, mut rx) = connect(&server, 16);
        let _ = server.register(&conn).unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);

        let snapshot = next(&mut rx).await;
        assert_eq!(snapshot["event"], "snapshot");
        assert_eq!(snapshot["version"], 1);
        assert_eq!(snapshot["payload"][0]["uuid"], "ext-1");

        let _ = store.upsert("ext-1", payload("hash2")).await.unwrap();
        let update = next(&mut rx).await;
        assert_eq!(update["event"], "update");
        assert_eq!(update["version"], 2);
        assert_eq!(update["payload"]["files"]["index.js"], "hash2");

        let _ = store.remove("ext-1").await.unwrap();
        let remove = next(&mut rx).await;
        assert_eq!(remove["event"], "remove");
        assert_eq!(remove["version"], 3);
        assert!(remove.get("payload").is_none());
    }

    #[tokio::test]
    async fn stalled_connection_is_isolated() {
        let (store, server) = setup();
        let (slow, _slow_rx) = connect(&server, 1);
        let (fast, mut fast_rx) = connect(&server, 64);
        let _ = server.register(&slow).unwrap();
        let _ = server.register(&fast).unwrap();
        let _ = next(&mut fast_rx).await;

        for i in 0..5 {
            let _ = store.upsert("ext-1", payload(&format!("h{i}"))).await.unwrap();
        }
        for expected in 1..=5 {
            assert_eq!(next(&mut fast_rx).await["version"], expected);
        }

        assert_eq!(slow.state(), ConnectionState::Closing);
        assert!(server.connection(&slow.id).is_none());
        assert_eq!(server.connection_count(), 1);
        assert_eq!(fast.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn concurrent_writes_during_join_are_delivered_once() {
        let (store, server) = setup();
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let _ = store.upsert("ext-1", payload(&format!("h{i}"))).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        tokio::task::yield_now().await;
        let (conn, mut rx) = connect(&server, 128);
        let _ = server.register(&conn).unwrap();
        writer.await.unwrap();

        let snapshot = next(&mut rx).await;
        let mut last = snapshot["version"].as_u64().unwrap();
        while last < 50 {
            let update = next(&mut rx).await;
            let version = update["version"].as_u64().unwrap();
            assert_eq!(version, last + 1, "gap or duplicate after {last}");
            last = version;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_closes_everything_and_is_idempotent() {
        let (store, server) = setup();
        let (a, _rx_a) = connect(&server, 8);
        let (b, _rx_b) = connect(&server, 8);
        let _ = server.register(&a).unwrap();
        let _ = server.register(&b).unwrap();

        server.shutdown().await;
        server.shutdown().await;

        assert!(server.is_shutting_down());
        assert_eq!(server.connection_count(), 0);
        assert_eq!(a.state(), ConnectionState::Closed);
        assert_eq!(b.state(), ConnectionState::Closed);
        assert!(a.cancel_token().is_cancelled());

        // Later events and registrations are no-ops.
        let _ = store.upsert("ext-1", payload("a")).await.unwrap();
        let (c, _rx_c) = connect(&server, 8);
        assert!(matches!(server.register(&c), Err(BroadcastError::ShuttingDown)));
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn failed_initial_sync_unregisters() {
        let (_store, server) = setup();
        let (conn, rx) = connect(&server, 4);
        drop(rx);
        assert!(matches!(server.register(&conn), Err(BroadcastError::Send(_))));
        assert_eq!(server.connection_count(), 0);
        assert_eq!(conn.state(), ConnectionState::Closing);
    }
}
