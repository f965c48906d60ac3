//! Server configuration.

use std::time::Duration;

use extdev_settings::ExtDevSettings;
use serde::{Deserialize, Serialize};

use crate::websocket::session::SessionConfig;

/// Configuration for the dev server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path of the upgrade endpoint.
    pub ws_path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Seconds to wait for sessions on shutdown.
    pub shutdown_timeout_secs: u64,
    /// Public base URL advertised to clients, if different from the bind address.
    pub public_url: Option<String>,
    /// Development store domain used in preview links.
    pub store_fqdn: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ws_path: "/extensions".into(),
            max_connections: 50,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            shutdown_timeout_secs: 5,
            public_url: None,
            store_fqdn: None,
        }
    }
}

impl From<&ExtDevSettings> for ServerConfig {
    fn from(settings: &ExtDevSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            ws_path: server.ws_path.clone(),
            max_connections: server.max_connections,
            send_queue_capacity: server.send_queue_capacity,
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            shutdown_timeout_secs: server.shutdown_timeout_secs,
            public_url: settings.public_url.clone(),
            store_fqdn: settings.store_fqdn.clone(),
        }
    }
}

impl ServerConfig {
    /// Bounded wait for sessions during shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Session tuning derived from this config.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            send_queue_capacity: self.send_queue_capacity,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs.max(1)),
        }
    }
}
