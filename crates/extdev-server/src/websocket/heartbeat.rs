//! Idle watchdog for a dev client.
//!
//! Pings go out from the session writer; this task only tracks the deadline
//! set by the last inbound frame.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Nothing arrived from the client for `timeout`.
    TimedOut,
    /// The connection was closed or the server is shutting down.
    Cancelled,
}

/// Wait until the client has been silent for `timeout`, or `cancel` fires.
///
/// Sleeps until `last_seen + timeout`; an inbound frame in the meantime
/// pushes the deadline out and the wait starts over.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    loop {
        let deadline = connection.last_seen() + timeout;
        if deadline <= time::Instant::now() {
            return HeartbeatResult::TimedOut;
        }
        tokio::select! {
            () = time::sleep_until(deadline) => {}
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extdev_core::ConnectionId;
    use tokio::sync::mpsc;

    fn make_connection() -> Arc<ClientConnection> {
        let (tx, _rx) = mpsc::channel(32);
        Arc::new(ClientConnection::new(
            ConnectionId::from_raw("hb_conn"),
            tx,
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn heartbeat_cancelled() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            make_connection(),
            Duration::from_secs(300),
            cancel.clone(),
        ));
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out_after_timeout() {
        let conn = make_connection();
        let started = time::Instant::now();
        let result = run_heartbeat(
            Arc::clone(&conn),
            Duration::from_millis(300),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(conn.last_pong_elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn active_client_stays_alive() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Duration::from_millis(200),
            cancel.clone(),
        ));

        for _ in 0..10 {
            time::sleep(Duration::from_millis(150)).await;
            conn.mark_alive();
        }
        assert!(!handle.is_finished());
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn late_frame_extends_deadline() {
        let conn = make_connection();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Duration::from_millis(200),
            CancellationToken::new(),
        ));

        time::sleep(Duration::from_millis(150)).await;
        conn.mark_alive();
        time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        assert_eq!(handle.await.unwrap(), HeartbeatResult::TimedOut);
        assert!(conn.last_pong_elapsed() >= Duration::from_millis(200));
    }
}
