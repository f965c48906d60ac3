//! WebSocket session lifecycle: one connected dev client from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use extdev_core::ConnectionId;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::broadcast::BroadcastServer;
use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// How long the writer gets to flush a close frame after cancellation.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Per-session tuning.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Outbound queue depth.
    pub send_queue_capacity: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before the client is dropped.
    pub heartbeat_timeout: Duration,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers with the broadcast server (which queues the snapshot)
/// 2. Forwards queued frames to the socket and pings periodically
/// 3. Watches liveness and drops silent clients
/// 4. Reads (and ignores) inbound frames until close
/// 5. Unregisters and marks the connection closed
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_session(ws: WebSocket, conn_id: ConnectionId, broadcast: Arc<BroadcastServer>, config: SessionConfig) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let cancel = broadcast.child_token();
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx, cancel.clone()));

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(run_writer(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        config.heartbeat_interval,
        cancel.clone(),
    ));

    match broadcast.register(&connection) {
        Ok(_) => {
            let heartbeat = {
                let connection = Arc::clone(&connection);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let result =
                        run_heartbeat(Arc::clone(&connection), config.heartbeat_timeout, cancel).await;
                    if result == HeartbeatResult::TimedOut {
                        warn!(conn_id = %connection.id, elapsed = ?connection.last_pong_elapsed(), "client unresponsive, disconnecting");
                        let _ = connection.close();
                    }
                })
            };

            read_until_closed(&mut ws_rx, &connection, &cancel).await;
            heartbeat.abort();
        }
        Err(e) => {
            warn!(error = %e, "client not registered");
        }
    }

    // Clean up
    let _ = connection.close();
    let _ = broadcast.unregister(&conn_id);
    // A writer blocked on a full socket never observes cancellation.
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        debug!("writer did not finish in time, aborting");
        writer.abort();
    }
    connection.mark_closed();

    info!(
        dropped = connection.drop_count(),
        duration_secs = connection.age().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

async fn read_until_closed(
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
    connection: &ClientConnection,
    cancel: &CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = cancel.cancelled() => break,
        };
        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        match msg {
            Message::Close(frame) => {
                debug!(?frame, "client sent close frame");
                break;
            }
            Message::Text(text) => {
                debug!(len = text.len(), "ignoring client text frame");
            }
            Message::Binary(data) => {
                debug!(len = data.len(), "ignoring client binary frame");
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    ping_every: Duration,
    cancel: CancellationToken,
) {
    let mut ping_interval = tokio::time::interval(ping_every);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            frame = send_rx.recv() => {
                let Some(text) = frame else { break };
                if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                    debug!("socket write failed");
                    let _ = connection.close();
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    let _ = connection.close();
                    break;
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}
