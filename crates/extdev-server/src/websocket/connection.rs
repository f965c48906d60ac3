//! One connected dev client: outbound queue, lifecycle state, and the
//! per-uuid version filter that keeps delivery exactly-once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use extdev_core::{BroadcastMessage, ConnectionId, ExtensionUuid, StoreEvent};
use extdev_store::StoreSnapshot;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{ConnectionSendError, SerializationError};

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake done, initial snapshot not yet queued.
    Connecting,
    /// Receiving live events.
    Open,
    /// Close requested; socket task is winding down.
    Closing,
    /// Socket task finished.
    Closed,
}

/// Encode a wire message once, for sharing across connections.
pub fn encode(message: &BroadcastMessage) -> Result<Arc<String>, SerializationError> {
    let kind = match message {
        BroadcastMessage::Snapshot { .. } => "snapshot",
        BroadcastMessage::Update { .. } => "update",
        BroadcastMessage::Remove { .. } => "remove",
    };
    serde_json::to_string(message)
        .map(Arc::new)
        .map_err(|source| SerializationError { kind, source })
}

#[derive(Default)]
struct SyncState {
    live: bool,
    pending: Vec<(Arc<StoreEvent>, Arc<String>)>,
    watermarks: HashMap<ExtensionUuid, u64>,
}

impl SyncState {
    fn is_new(&self, event: &StoreEvent) -> bool {
        self.watermarks
            .get(event.uuid())
            .is_none_or(|seen| event.version() > *seen)
    }

    fn advance(&mut self, event: &StoreEvent) {
        let _ = self
            .watermarks
            .insert(event.uuid().clone(), event.version());
    }
}

/// A connected dev client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    state: watch::Sender<ConnectionState>,
    sync: Mutex<SyncState>,
    cancel: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    last_seen: Mutex<TokioInstant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in [`ConnectionState::Connecting`].
    ///
    /// Frames pushed to it land in `tx`; `cancel` is fired when the
    /// connection is asked to close.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            id,
            tx,
            state,
            sync: Mutex::new(SyncState::default()),
            cancel,
            connected_at: now,
            last_seen: Mutex::new(TokioInstant::now()),
            dropped_messages: AtomicU64::new(0),
        }
    }

    fn push(&self, frame: Arc<String>) -> Result<(), ConnectionSendError> {
        self.tx.try_send(frame).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => ConnectionSendError::QueueFull(self.id.clone()),
                mpsc::error::TrySendError::Closed(_) => ConnectionSendError::Closed(self.id.clone()),
            }
        })
    }

    /// Offer a store event to this connection.
    ///
    /// While the initial sync is in progress the event is buffered. Once
    /// live, it is queued only if newer than anything already sent for its
    /// uuid. Returns whether a frame was queued.
    pub fn deliver(&self, event: &Arc<StoreEvent>, frame: &Arc<String>) -> Result<bool, ConnectionSendError> {
        let mut sync = self.sync.lock();
        if !sync.live {
            sync.pending.push((Arc::clone(event), Arc::clone(frame)));
            return Ok(false);
        }
        if !sync.is_new(event) {
            debug!(conn_id = %self.id, uuid = %event.uuid(), version = event.version(), "skipping already-delivered event");
            return Ok(false);
        }
        self.push(Arc::clone(frame))?;
        sync.advance(event);
        Ok(true)
    }

    /// Queue the snapshot, then every buffered event it does not cover, and go live.
    ///
    /// Returns the number of buffered events forwarded after the snapshot.
    /// On success the connection moves to [`ConnectionState::Open`].
    pub fn complete_sync(&self, snapshot: &StoreSnapshot) -> Result<usize, crate::errors::BroadcastError> {
        let frame = encode(&snapshot.to_message())?;
        let mut sync = self.sync.lock();
        self.push(frame)?;
        sync.watermarks.clone_from(&snapshot.watermarks);

        let pending = std::mem::take(&mut sync.pending);
        let mut forwarded = 0;
        for (event, frame) in pending {
            if sync.is_new(&event) {
                self.push(frame)?;
                sync.advance(&event);
                forwarded += 1;
            }
        }
        sync.live = true;
        drop(sync);

        let _ = self.state.send_if_modified(|s| {
            if *s == ConnectionState::Connecting {
                *s = ConnectionState::Open;
                true
            } else {
                false
            }
        });
        Ok(forwarded)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Request the connection to close.
    ///
    /// Moves `Connecting`/`Open` to `Closing` and signals the socket task.
    /// Returns `false` (and does nothing) if already closing or closed.
    pub fn close(&self) -> bool {
        let changed = self.state.send_if_modified(|s| match s {
            ConnectionState::Connecting | ConnectionState::Open => {
                *s = ConnectionState::Closing;
                true
            }
            ConnectionState::Closing | ConnectionState::Closed => false,
        });
        if changed {
            self.cancel.cancel();
        }
        changed
    }

    /// Record that the socket task has finished.
    pub fn mark_closed(&self) {
        let _ = self.state.send_replace(ConnectionState::Closed);
        self.cancel.cancel();
    }

    /// Resolve once the connection reaches [`ConnectionState::Closed`].
    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// Token fired when the connection is asked to close.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record an inbound frame.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = TokioInstant::now();
    }

    /// When the last inbound frame arrived (or the connection was established).
    pub fn last_seen(&self) -> TokioInstant {
        *self.last_seen.lock()
    }

    /// Duration since the last inbound frame.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_seen().elapsed()
    }

    /// Frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extdev_core::ExtensionPayload;
    use extdev_store::StoreState;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(ConnectionId::from_raw("conn_1"), tx, CancellationToken::new());
        (conn, rx)
    }

    fn event_and_frame(state: &mut StoreState, uuid: &str, hash: &str) -> (Arc<StoreEvent>, Arc<String>) {
        let (_, event) = state.upsert(uuid.into(), ExtensionPayload::default().with_file("index.js", hash));
        let event = Arc::new(event.unwrap());
        let frame = encode(&BroadcastMessage::from(&*event)).unwrap();
        (event, frame)
    }

    fn recv_json(rx: &mut mpsc::Receiver<Arc<String>>) -> serde_json::Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn starts_connecting() {
        let (conn, _rx) = make_connection(8);
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_refresh_last_seen() {
        let (conn, _rx) = make_connection(8);
        let established = conn.last_seen();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(conn.last_pong_elapsed(), Duration::from_secs(5));

        conn.mark_alive();
        assert_eq!(conn.last_seen(), established + Duration::from_secs(5));
        assert_eq!(conn.last_pong_elapsed(), Duration::ZERO);
    }

    #[test]
    fn events_before_sync_are_buffered_and_deduplicated() {
        let (conn, mut rx) = make_connection(8);
        let mut state = StoreState::new();

        let (e1, f1) = event_and_frame(&mut state, "ext-1", "hash1");
        assert!(!conn.deliver(&e1, &f1).unwrap());
        assert!(rx.try_recv().is_err());

        let snapshot = state.snapshot();
        let (e2, f2) = event_and_frame(&mut state, "ext-1", "hash2");
        assert!(!conn.deliver(&e2, &f2).unwrap());

        let forwarded = conn.complete_sync(&snapshot).unwrap();
        assert_eq!(forwarded, 1);
        assert_eq!(conn.state(), ConnectionState::Open);

        let snap = recv_json(&mut rx);
        assert_eq!(snap["event"], "snapshot");
        assert_eq!(snap["version"], 1);
        let update = recv_json(&mut rx);
        assert_eq!(update["event"], "update");
        assert_eq!(update["version"], 2);
        assert!(rx.try_recv().is_err());

        // Replays never get through once live.
        assert!(!conn.deliver(&e2, &f2).unwrap());
        assert!(!conn.deliver(&e1, &f1).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn live_delivery_advances_watermark() {
        let (conn, mut rx) = make_connection(8);
        let mut state = StoreState::new();
        let _ = conn.complete_sync(&state.snapshot()).unwrap();
        let _ = recv_json(&mut rx);

        let (e1, f1) = event_and_frame(&mut state, "ext-1", "a");
        assert!(conn.deliver(&e1, &f1).unwrap());
        assert!(!conn.deliver(&e1, &f1).unwrap());
        assert_eq!(recv_json(&mut rx)["uuid"], "ext-1");
    }

    #[test]
    fn full_queue_reports_error() {
        let (conn, _rx) = make_connection(1);
        let mut state = StoreState::new();
        let _ = conn.complete_sync(&state.snapshot()).unwrap();

        let (e1, f1) = event_and_frame(&mut state, "ext-1", "a");
        let err = conn.deliver(&e1, &f1).unwrap_err();
        assert!(matches!(err, ConnectionSendError::QueueFull(_)));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn closed_queue_reports_error() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        let err = conn.complete_sync(&StoreState::new().snapshot()).unwrap_err();
        assert!(matches!(
            err,
            crate::errors::BroadcastError::Send(ConnectionSendError::Closed(_))
        ));
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn close_transitions_once() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.close());
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.cancel_token().is_cancelled());
        assert!(!conn.close());

        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.close());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn sync_after_close_stays_closing() {
        let (conn, _rx) = make_connection(4);
        let _ = conn.close();
        let _ = conn.complete_sync(&StoreState::new().snapshot()).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[tokio::test]
    async fn wait_closed_resolves_on_mark_closed() {
        let (conn, _rx) = make_connection(4);
        let conn = Arc::new(conn);
        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.wait_closed().await })
        };
        let _ = conn.close();
        conn.mark_closed();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
