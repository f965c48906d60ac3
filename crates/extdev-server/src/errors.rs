//! Server error types.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use extdev_core::ConnectionId;
use thiserror::Error;

/// WebSocket protocol version this server speaks.
pub const WEBSOCKET_VERSION: &str = "13";

/// A WebSocket handshake the server refuses to complete.
///
/// Answered with a protocol-level HTTP rejection; never propagated further.
#[derive(Debug, Error)]
pub enum MalformedUpgradeError {
    /// `Sec-WebSocket-Version` missing or not `13`.
    #[error("unsupported websocket version: {0}")]
    UnsupportedVersion(String),
    /// Any other handshake defect (method, `Connection`, `Upgrade`, key).
    #[error("websocket handshake rejected: {message}")]
    Rejected {
        /// Status to answer with.
        status: StatusCode,
        /// Reason sent in the body.
        message: String,
    },
}

impl From<WebSocketUpgradeRejection> for MalformedUpgradeError {
    fn from(rejection: WebSocketUpgradeRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for MalformedUpgradeError {
    fn into_response(self) -> Response {
        match self {
            Self::UnsupportedVersion(_) => {
                let mut resp = (StatusCode::UPGRADE_REQUIRED, self.to_string()).into_response();
                let _ = resp.headers_mut().insert(
                    header::SEC_WEBSOCKET_VERSION,
                    HeaderValue::from_static(WEBSOCKET_VERSION),
                );
                resp
            }
            Self::Rejected { status, message } => (status, message).into_response(),
        }
    }
}

/// Why a well-formed upgrade was not admitted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServiceUnavailable {
    /// Shutdown has started.
    #[error("server is shutting down")]
    ShuttingDown,
    /// `max_connections` clients are already connected.
    #[error("connection limit reached ({0})")]
    AtCapacity(usize),
}

impl IntoResponse for ServiceUnavailable {
    fn into_response(self) -> Response {
        (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
    }
}

/// Failure to enqueue a frame for one connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionSendError {
    /// The connection's outbound queue is full (client too slow).
    #[error("outbound queue full for {0}")]
    QueueFull(ConnectionId),
    /// The connection's writer has gone away.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}

/// An event could not be encoded for the wire.
#[derive(Debug, Error)]
#[error("failed to serialize {kind} message: {source}")]
pub struct SerializationError {
    /// Message kind (`snapshot`, `update`, `remove`).
    pub kind: &'static str,
    /// Underlying encoder error.
    #[source]
    pub source: serde_json::Error,
}

/// Errors raised by the broadcast server.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Registration attempted after shutdown started.
    #[error("broadcast server is shutting down")]
    ShuttingDown,
    /// Initial sync could not be delivered.
    #[error(transparent)]
    Send(#[from] ConnectionSendError),
    /// Snapshot could not be encoded.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}
