//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};

/// Top-level settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtDevSettings {
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: LogLevel,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
    /// Public URL clients reach the server on (tunnel URL); derived from host/port when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Development store domain used in preview links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_fqdn: Option<String>,
}

impl Default for ExtDevSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            log_level: LogLevel::Info,
            log_json: false,
            public_url: None,
            store_fqdn: None,
        }
    }
}

impl ExtDevSettings {
    /// Public base URL, falling back to `http://<host>:<port>`.
    pub fn public_url(&self) -> String {
        self.public_url.clone().unwrap_or_else(|| {
            format!("http://{}:{}", self.server.host, self.server.port)
        })
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 picks a free port).
    pub port: u16,
    /// Upgrade endpoint path.
    pub ws_path: String,
    /// Maximum concurrent dev clients.
    pub max_connections: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of client silence before the connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Seconds to wait for sessions to close on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
            ws_path: "/extensions".to_string(),
            max_connections: 50,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            shutdown_timeout_secs: 5,
        }
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name, case-insensitive.
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}
