//! Upgrade handler for the extensions endpoint.
//!
//! Plain `GET` requests receive the current extension listing as JSON;
//! WebSocket handshakes are validated, admitted against the connection
//! limit and handed to [`run_session`].

use axum::Json;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use extdev_core::{ConnectionId, ExtensionInstance};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

use super::session::run_session;
use crate::errors::{MalformedUpgradeError, ServiceUnavailable, WEBSOCKET_VERSION};
use crate::metrics::WS_UPGRADES_REJECTED_TOTAL;
use crate::server::AppState;

/// Body of a non-upgrade `GET` on the extensions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionsResponse {
    /// Every extension currently held by the payload store.
    pub extensions: Vec<ExtensionInstance>,
    /// Server version.
    pub version: &'static str,
}

/// `GET <ws_path>`: WebSocket upgrade, or the JSON listing without one.
pub async fn extensions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !headers.contains_key(header::UPGRADE) {
        let snapshot = state.store.snapshot();
        return Json(ExtensionsResponse {
            extensions: snapshot.entries,
            version: env!("CARGO_PKG_VERSION"),
        })
        .into_response();
    }

    if let Err(e) = check_version(&headers) {
        debug!(error = %e, "handshake refused");
        counter!(WS_UPGRADES_REJECTED_TOTAL, "reason" => "version").increment(1);
        return e.into_response();
    }

    if let Err(e) = admit(&state) {
        warn!(error = %e, "upgrade refused");
        let reason = match e {
            ServiceUnavailable::ShuttingDown => "shutting_down",
            ServiceUnavailable::AtCapacity(_) => "capacity",
        };
        counter!(WS_UPGRADES_REJECTED_TOTAL, "reason" => reason).increment(1);
        return e.into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            let e = MalformedUpgradeError::from(rejection);
            debug!(error = %e, "handshake refused");
            counter!(WS_UPGRADES_REJECTED_TOTAL, "reason" => "malformed").increment(1);
            return e.into_response();
        }
    };

    let broadcast = state.broadcast.clone();
    let session = state.config.session();
    ws.on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| run_session(socket, ConnectionId::new(), broadcast, session))
}

fn check_version(headers: &HeaderMap) -> Result<(), MalformedUpgradeError> {
    let version = headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    if version.trim() == WEBSOCKET_VERSION {
        Ok(())
    } else {
        Err(MalformedUpgradeError::UnsupportedVersion(version))
    }
}

// Count is read without a lock held across the upgrade, so a burst can
// briefly exceed the limit by the number of in-flight handshakes.
fn admit(state: &AppState) -> Result<(), ServiceUnavailable> {
    if state.broadcast.is_shutting_down() {
        return Err(ServiceUnavailable::ShuttingDown);
    }
    let max = state.config.max_connections;
    if state.broadcast.connection_count() >= max {
        return Err(ServiceUnavailable::AtCapacity(max));
    }
    Ok(())
}
