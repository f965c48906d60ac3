//! Single-writer payload store.
//!
//! All mutations go through one mpsc command queue drained by one task. That
//! task applies the change and dispatches the resulting event to every
//! subscriber while still holding the state write lock, so subscribers see
//! events in exactly the order mutations were requested, and readers calling
//! [`PayloadStore::snapshot`] never observe a half-applied change.

use std::sync::Arc;

use extdev_core::{ExtensionInstance, ExtensionPayload, ExtensionUuid, StoreEvent};
use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};
use crate::state::{StoreSnapshot, StoreState, UpsertOutcome};

/// Default depth of the writer's command queue.
pub const DEFAULT_COMMAND_QUEUE: usize = 1024;

enum Command {
    Upsert {
        uuid: ExtensionUuid,
        payload: ExtensionPayload,
        reply: oneshot::Sender<UpsertOutcome>,
    },
    Remove {
        uuid: ExtensionUuid,
        reply: oneshot::Sender<Option<u64>>,
    },
}

#[derive(Default)]
struct Shared {
    state: StoreState,
    subscribers: Vec<mpsc::UnboundedSender<Arc<StoreEvent>>>,
}

impl Shared {
    fn dispatch(&mut self, event: StoreEvent) {
        counter!("store_events_total", "kind" => event.kind()).increment(1);
        let event = Arc::new(event);
        // Dropped receivers are pruned here; that is how unsubscribing works.
        self.subscribers
            .retain(|tx| tx.send(Arc::clone(&event)).is_ok());
    }
}

/// Receiving side of a store subscription. Dropping it unsubscribes.
pub struct StoreSubscription {
    rx: mpsc::UnboundedReceiver<Arc<StoreEvent>>,
}

impl StoreSubscription {
    /// Next event, or `None` once the store has shut down.
    pub async fn recv(&mut self) -> Option<Arc<StoreEvent>> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<StoreEvent>> {
        self.rx.try_recv().ok()
    }
}

/// Cloneable handle to the payload store.
#[derive(Clone)]
pub struct PayloadStore {
    commands: mpsc::Sender<Command>,
    shared: Arc<RwLock<Shared>>,
    cancel: CancellationToken,
}

impl PayloadStore {
    /// Spawn the writer task and return a handle to it.
    pub fn start(queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let shared = Arc::new(RwLock::new(Shared::default()));
        let cancel = CancellationToken::new();
        let writer = tokio::spawn(run_writer(rx, Arc::clone(&shared), cancel.clone()));
        (
            Self {
                commands: tx,
                shared,
                cancel,
            },
            writer,
        )
    }

    /// Create or update the payload for `uuid`.
    pub async fn upsert(
        &self,
        uuid: impl Into<ExtensionUuid>,
        payload: ExtensionPayload,
    ) -> Result<UpsertOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Upsert {
            uuid: uuid.into(),
            payload,
            reply,
        })
        .await?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Remove `uuid`. Returns the removal version, or `None` if it was not tracked.
    pub async fn remove(&self, uuid: impl Into<ExtensionUuid>) -> Result<Option<u64>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Remove {
            uuid: uuid.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    async fn send(&self, command: Command) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Closed);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| StoreError::Closed)
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> StoreSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = self.shared.write();
        if !self.cancel.is_cancelled() {
            shared.subscribers.push(tx);
        }
        StoreSubscription { rx }
    }

    /// Consistent point-in-time view of every entry.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.shared.read().state.snapshot()
    }

    /// Current state of one extension.
    pub fn get(&self, uuid: &str) -> Option<ExtensionInstance> {
        self.shared
            .read()
            .state
            .get(uuid)
            .map(|e| e.instance.clone())
    }

    /// Number of tracked extensions.
    pub fn len(&self) -> usize {
        self.shared.read().state.len()
    }

    /// Whether no extension is tracked.
    pub fn is_empty(&self) -> bool {
        self.shared.read().state.is_empty()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .read()
            .subscribers
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Stop the writer. Pending and future mutations fail with [`StoreError::Closed`].
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<Command>,
    shared: Arc<RwLock<Shared>>,
    cancel: CancellationToken,
) {
    debug!("payload store writer started");
    loop {
        let command = tokio::select! {
            command = rx.recv() => match command {
                Some(c) => c,
                None => break,
            },
            () = cancel.cancelled() => break,
        };

        match command {
            Command::Upsert {
                uuid,
                payload,
                reply,
            } => {
                let mut guard = shared.write();
                let (outcome, event) = guard.state.upsert(uuid.clone(), payload);
                if let Some(event) = event {
                    guard.dispatch(event);
                }
                drop(guard);
                debug!(uuid = %uuid, version = outcome.version(), emitted = outcome.emitted(), "upsert applied");
                let _ = reply.send(outcome);
            }
            Command::Remove { uuid, reply } => {
                let mut guard = shared.write();
                let removed = guard.state.remove(&uuid).map(|event| {
                    let version = event.version();
                    guard.dispatch(event);
                    version
                });
                drop(guard);
                debug!(uuid = %uuid, version = ?removed, "remove applied");
                let _ = reply.send(removed);
            }
        }
    }

    rx.close();
    shared.write().subscribers.clear();
    info!("payload store writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(hash: &str) -> ExtensionPayload {
        ExtensionPayload::default().with_file("index.js", hash)
    }

    #[tokio::test]
    async fn upsert_emits_in_call_order() {
        let (store, _writer) = PayloadStore::start(16);
        let mut sub = store.subscribe();

        let first = store.upsert("ext-1", payload("hash1")).await.unwrap();
        let second = store.upsert("ext-1", payload("hash2")).await.unwrap();
        assert_eq!(first, UpsertOutcome::Created { version: 1 });
        assert_eq!(second, UpsertOutcome::Updated { version: 2 });

        let e1 = sub.recv().await.unwrap();
        let e2 = sub.recv().await.unwrap();
        assert_eq!(e1.version(), 1);
        assert_eq!(e2.version(), 2);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn unchanged_upsert_emits_nothing() {
        let (store, _writer) = PayloadStore::start(16);
        let mut sub = store.subscribe();

        let _ = store.upsert("ext-1", payload("hash1")).await.unwrap();
        let again = store.upsert("ext-1", payload("hash1")).await.unwrap();
        assert_eq!(again, UpsertOutcome::Unchanged { version: 1 });

        assert!(sub.recv().await.is_some());
        assert!(sub.try_recv().is_none());
        assert_eq!(store.get("ext-1").unwrap().version, 1);
    }

    #[tokio::test]
    async fn remove_then_recreate() {
        let (store, _writer) = PayloadStore::start(16);
        let _ = store.upsert("ext-1", payload("a")).await.unwrap();
        assert_eq!(store.remove("ext-1").await.unwrap(), Some(2));
        assert_eq!(store.remove("ext-1").await.unwrap(), None);
        assert!(store.is_empty());

        let again = store.upsert("ext-1", payload("a")).await.unwrap();
        assert_eq!(again, UpsertOutcome::Created { version: 3 });
    }

    #[tokio::test]
    async fn concurrent_writers_get_distinct_versions() {
        let (store, _writer) = PayloadStore::start(4);
        let mut sub = store.subscribe();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert("shared", payload(&format!("h{i}")))
                    .await
                    .unwrap()
                    .version()
            }));
        }
        let mut versions = Vec::new();
        for h in handles {
            versions.push(h.await.unwrap());
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=20).collect::<Vec<u64>>());

        // Emission order matches version order.
        for expected in 1..=20 {
            assert_eq!(sub.recv().await.unwrap().version(), expected);
        }
    }

    #[tokio::test]
    async fn snapshot_reflects_applied_mutations() {
        let (store, _writer) = PayloadStore::start(16);
        let _ = store.upsert("ext-1", payload("hash1")).await.unwrap();
        let _ = store.upsert("ext-2", payload("x")).await.unwrap();
        let _ = store.upsert("ext-1", payload("hash2")).await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].uuid.as_str(), "ext-1");
        assert_eq!(snapshot.entries[0].version, 2);
        assert_eq!(snapshot.version, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let (store, _writer) = PayloadStore::start(16);
        let sub = store.subscribe();
        let _keep = store.subscribe();
        assert_eq!(store.subscriber_count(), 2);
        drop(sub);
        let _ = store.upsert("ext-1", payload("a")).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn closed_store_rejects_mutations() {
        let (store, writer) = PayloadStore::start(16);
        let mut sub = store.subscribe();
        store.close();
        writer.await.unwrap();

        assert!(store.is_closed());
        assert_eq!(
            store.upsert("ext-1", payload("a")).await,
            Err(StoreError::Closed)
        );
        assert_eq!(store.remove("ext-1").await, Err(StoreError::Closed));
        // Subscribers observe the shutdown as end-of-stream.
        assert!(sub.recv().await.is_none());
    }
}
